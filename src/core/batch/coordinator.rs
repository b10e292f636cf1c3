//! Batch coordinator - main orchestrator for one extract
//!
//! A batch runs in fixed steps:
//!
//! 1. validate the payload and check every type tag has a format and a transformer
//! 2. resolve the single schema version of the batch
//! 3. delete pre-pass (optional): look up deleted keys in the store
//! 4. open one cursor per file
//! 5. run the transformer passes in [`PIPELINE_ORDER`], waiting for the filer
//!    and escalating record errors after each file
//! 6. apply children whose problem was never delivered in this batch to the
//!    stored problem
//! 7. close every cursor and shut the filer down

use super::pool::LookupPool;
use super::prepass::{collect_deleted_keys, find_filed};
use super::summary::BatchSummary;
use crate::adapters::exchange::Payload;
use crate::adapters::filer::ResourceFiler;
use crate::adapters::store::{create_store, ResourceStore};
use crate::adapters::terminology::{create_terminology, TerminologyService};
use crate::config::TributaryConfig;
use crate::core::parse::{
    determine_version, resolve_version, FormatDispatcher, SchemaRegistry, VersionDetermination,
    VersionSelection,
};
use crate::core::transform::{
    run_transformer_with_policy, transformer_for, DateOverrides, FailurePolicy, TransformContext,
    PIPELINE_ORDER,
};
use crate::domain::{Result, SchemaVersion, TributaryError};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Batch coordinator
pub struct BatchCoordinator {
    config: TributaryConfig,
    store: Arc<dyn ResourceStore + Send + Sync>,
    terminology: Arc<dyn TerminologyService + Send + Sync>,
    dispatcher: FormatDispatcher,
}

impl BatchCoordinator {
    /// Create a coordinator over existing collaborators and the bundled formats
    pub fn new(
        config: TributaryConfig,
        store: Arc<dyn ResourceStore + Send + Sync>,
        terminology: Arc<dyn TerminologyService + Send + Sync>,
    ) -> Self {
        let dispatcher = FormatDispatcher::with_builtin_formats(Arc::new(SchemaRegistry::builtin()));
        Self {
            config,
            store,
            terminology,
            dispatcher,
        }
    }

    /// Create a coordinator with the store and terminology service the
    /// configuration selects
    ///
    /// The store's connection is tested and its schema created.
    pub async fn from_config(config: TributaryConfig) -> Result<Self> {
        let store = create_store(&config).await?;
        store.test_connection().await?;
        store.ensure_schema().await?;
        let terminology = create_terminology(&config.terminology)?;
        Ok(Self::new(config, store, terminology))
    }

    /// Replace the format dispatcher
    pub fn with_dispatcher(mut self, dispatcher: FormatDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher(&self) -> &FormatDispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore + Send + Sync> {
        &self.store
    }

    /// Version selection from `[source]`
    ///
    /// # Errors
    ///
    /// Returns [`TributaryError::Configuration`] for a malformed version string.
    pub fn version_selection(&self) -> Result<VersionSelection> {
        let parse = |v: &str| SchemaVersion::new(v).map_err(TributaryError::Configuration);
        match &self.config.source.version {
            Some(version) => Ok(VersionSelection::Declared(parse(version)?)),
            None => {
                let candidates = self
                    .config
                    .source
                    .candidate_versions
                    .iter()
                    .map(|v| parse(v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(VersionSelection::Discover(candidates))
            }
        }
    }

    /// Run version discovery over a payload without transforming anything
    ///
    /// A declared version is ignored; the configured candidates (or every
    /// known version) are tested.
    pub fn detect_version(&self, payload: &Payload) -> Result<VersionDetermination> {
        payload.validate()?;
        let candidates = match self.version_selection()? {
            VersionSelection::Discover(candidates) if !candidates.is_empty() => candidates,
            _ => self.dispatcher.registry().known_versions(),
        };
        determine_version(&self.dispatcher, payload.files(), &candidates)
    }

    fn failure_policy(&self, file_type: &str, default: FailurePolicy) -> FailurePolicy {
        if self.config.transform.fail_fast.iter().any(|t| t == file_type) {
            FailurePolicy::FailFast
        } else {
            default
        }
    }

    /// Process one payload end to end
    ///
    /// # Errors
    ///
    /// Any fatal error aborts the batch: payload or version errors before a row
    /// is read, a fail-fast record error, [`TributaryError::RecordErrors`] after
    /// a file with collected record errors, and filer or terminology failures.
    /// Cursors are released on every path.
    pub async fn process(&self, payload: &Payload) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();

        let directory = payload.validate()?;
        let files = payload.files();
        for file in files {
            self.dispatcher.spec_for(file)?;
            if transformer_for(&file.type_tag).is_none() {
                return Err(TributaryError::UnknownFileType {
                    type_tag: file.type_tag.clone(),
                    path: file.path.display().to_string(),
                });
            }
        }

        crate::log_batch_start!(batch_id, files.len());
        tracing::debug!(directory = %directory.display(), "Payload validated");

        let version = resolve_version(&self.dispatcher, files, &self.version_selection()?)?;
        let mut summary = BatchSummary::new(&batch_id, version.as_str(), self.store.store_name());
        summary.dry_run = self.config.application.dry_run;

        let filed = if self.config.transform.prepass_deletes {
            let deleted = collect_deleted_keys(&self.dispatcher, files, &version)?;
            summary.prepass_checked = deleted.len();
            let pool = LookupPool::new(self.config.transform.lookup_workers);
            let filed = find_filed(self.store.clone(), &pool, deleted).await?;
            summary.prepass_filed = filed.len();
            Some(filed)
        } else {
            None
        };

        let filer = ResourceFiler::new(self.store.clone(), self.config.filer.queues);
        let mut ctx = TransformContext::new(
            filer,
            self.terminology.clone(),
            DateOverrides::from_config(&self.config.transform.date_overrides),
        );
        if let Some(filed) = filed {
            ctx = ctx.with_filed_keys(filed);
        }

        let mut batch = self.dispatcher.open_batch(files, &version)?;

        for file_type in PIPELINE_ORDER {
            let Some(transformer) = transformer_for(file_type) else {
                continue;
            };
            let policy = self.failure_policy(file_type, transformer.failure_policy());

            for (file, cursor) in batch.cursors_for(file_type) {
                let report =
                    run_transformer_with_policy(cursor.as_mut(), transformer.as_ref(), policy, &mut ctx)
                        .await?;
                cursor.close();

                ctx.filer.wait_to_finish().await?;
                ctx.filer.fail_if_any_errors()?;

                tracing::debug!(
                    file = %file.path.display(),
                    pending_problems = ctx.problem_links.pending_owner_count(),
                    "Filed pass"
                );
                report.escalate()?;
                summary.add_pass(report);
            }
        }

        summary.relationships = ctx.problem_links.apply_remaining_to_store(&ctx.filer).await?;
        ctx.filer.wait_to_finish().await?;
        ctx.filer.fail_if_any_errors()?;
        batch.close();

        summary.filing = ctx.filer.shutdown().await?;
        let summary = summary.with_duration(start_time.elapsed());

        crate::log_batch_complete!(
            batch_id,
            summary.filing.saved,
            summary.filing.deleted,
            summary.duration
        );
        Ok(summary)
    }
}
