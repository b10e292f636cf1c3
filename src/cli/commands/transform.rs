//! Transform command implementation
//!
//! This module implements the `transform` command, which processes one
//! extract payload (a directory or a JSON manifest) end to end.

use super::exit_code_for;
use crate::adapters::exchange::Payload;
use crate::config::{load_config, FilerTarget};
use crate::core::batch::{BatchCoordinator, BatchSummary};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the transform command
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Payload directory or JSON manifest
    pub payload: PathBuf,

    /// Dry run mode - transform everything into an in-memory store
    #[arg(long)]
    pub dry_run: bool,

    /// Override the declared schema version
    #[arg(long, value_name = "VERSION")]
    pub schema_version: Option<String>,

    /// Print the batch summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl TransformArgs {
    /// Execute the transform command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(payload = %self.payload.display(), "Starting transform command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if let Some(version) = &self.schema_version {
            tracing::info!(version = %version, "Overriding schema version from CLI");
            config.source.version = Some(version.clone());
        }

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if config.application.dry_run && config.filer.target != FilerTarget::Memory {
            tracing::info!(
                configured = ?config.filer.target,
                "Dry run mode enabled - filing to an in-memory store"
            );
            config.filer.target = FilerTarget::Memory;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - No data will be written to the configured store");
            println!();
        }

        let payload = match Payload::load(&self.payload) {
            Ok(p) => p,
            Err(e) => {
                crate::log_error_with_context!(&e, "Failed to load payload");
                eprintln!("Failed to load payload: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let coordinator = match BatchCoordinator::from_config(config).await {
            Ok(c) => c,
            Err(e) => {
                crate::log_error_with_context!(&e, "Failed to initialize batch");
                eprintln!("Failed to initialize batch: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!(
            "🚀 Transforming {} file(s) from {}",
            payload.files().len(),
            self.payload.display()
        );
        println!();

        match coordinator.process(&payload).await {
            Ok(summary) => {
                summary.log_summary();
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                } else {
                    Self::print_summary(&summary);
                }
                Ok(if summary.is_successful() { 0 } else { 1 })
            }
            Err(e) => {
                crate::log_error_with_context!(&e, "Batch failed");
                println!("❌ Batch failed");
                println!("   Error: {e}");
                Ok(exit_code_for(&e))
            }
        }
    }

    fn print_summary(summary: &BatchSummary) {
        println!("✅ Batch completed");
        println!();
        println!("Batch Summary:");
        println!("  Batch ID: {}", summary.batch_id);
        println!("  Schema Version: {}", summary.version);
        println!("  Store: {}", summary.store);
        for pass in &summary.passes {
            println!(
                "  {}: {} record(s), {} saved, {} deleted, {} skipped",
                pass.file_type, pass.records, pass.saved, pass.deleted, pass.skipped
            );
        }
        println!(
            "  Deferred Links: {} applied, {} dropped",
            summary.relationships.applied_children, summary.relationships.dropped_children
        );
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_config_is_exit_code_two() {
        let args = TransformArgs {
            payload: PathBuf::from("/nonexistent/payload"),
            dry_run: true,
            schema_version: None,
            json: false,
        };
        assert_eq!(args.execute("/nonexistent/tributary.toml").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_payload_is_fatal() {
        let mut config = tempfile::NamedTempFile::new().unwrap();
        writeln!(config, "[application]\nlog_level = \"info\"").unwrap();

        let args = TransformArgs {
            payload: PathBuf::from("/nonexistent/manifest.json"),
            dry_run: true,
            schema_version: None,
            json: false,
        };
        let path = config.path().to_string_lossy().to_string();
        assert_eq!(args.execute(&path).await.unwrap(), 5);
    }
}
