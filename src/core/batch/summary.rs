//! Batch summary and reporting

use crate::adapters::filer::FilerStats;
use crate::core::relationships::ApplyReport;
use crate::core::transform::PassReport;
use serde::Serialize;
use std::time::Duration;

/// Summary of one processed batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Identifier logged with every batch event
    pub batch_id: String,

    /// Schema version assigned to every file
    pub version: String,

    /// Store the batch was filed to
    pub store: String,

    pub dry_run: bool,

    /// Deleted keys looked up by the pre-pass, and how many were found filed
    pub prepass_checked: usize,
    pub prepass_filed: usize,

    /// One report per file, in processing order
    pub passes: Vec<PassReport>,

    /// End-of-batch relationship cleanup
    pub relationships: ApplyReport,

    /// Final filer counters
    pub filing: FilerStats,

    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

impl BatchSummary {
    pub fn new(batch_id: impl Into<String>, version: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            version: version.into(),
            store: store.into(),
            dry_run: false,
            prepass_checked: 0,
            prepass_filed: 0,
            passes: Vec::new(),
            relationships: ApplyReport::default(),
            filing: FilerStats::default(),
            duration: Duration::from_secs(0),
        }
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn add_pass(&mut self, report: PassReport) {
        self.passes.push(report);
    }

    /// Total records read across every file
    pub fn total_records(&self) -> usize {
        self.passes.iter().map(|p| p.records).sum()
    }

    pub fn total_saved(&self) -> usize {
        self.passes.iter().map(|p| p.saved).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.passes.iter().map(|p| p.deleted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.passes.iter().map(|p| p.skipped).sum()
    }

    /// Record errors across every pass
    pub fn total_errors(&self) -> usize {
        self.passes.iter().map(PassReport::error_count).sum()
    }

    /// Check if the batch completed without record errors or filing failures
    pub fn is_successful(&self) -> bool {
        self.total_errors() == 0 && self.filing.failed == 0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            batch_id = %self.batch_id,
            version = %self.version,
            store = %self.store,
            dry_run = self.dry_run,
            files = self.passes.len(),
            records = self.total_records(),
            saved = self.total_saved(),
            deleted = self.total_deleted(),
            skipped_deletes = self.total_skipped(),
            linked = self.relationships.applied_children,
            dropped_links = self.relationships.dropped_children,
            duration_secs = self.duration.as_secs(),
            "Batch summary"
        );

        for pass in self.passes.iter().filter(|p| p.error_count() > 0) {
            tracing::warn!(
                file = %pass.file,
                file_type = %pass.file_type,
                errors = pass.error_count(),
                "File completed with record errors"
            );
        }
    }
}
