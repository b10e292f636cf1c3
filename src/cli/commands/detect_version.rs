//! Detect-version command implementation
//!
//! Runs schema version discovery over a payload and reports the candidates
//! each file is compatible with. Nothing is transformed or filed.

use super::exit_code_for;
use crate::adapters::exchange::Payload;
use crate::adapters::store::MemoryStore;
use crate::adapters::terminology::static_map::StaticTerminology;
use crate::config::load_config;
use crate::core::batch::BatchCoordinator;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the detect-version command
#[derive(Args, Debug)]
pub struct DetectVersionArgs {
    /// Payload directory or JSON manifest
    pub payload: PathBuf,
}

impl DetectVersionArgs {
    /// Execute the detect-version command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let payload = match Payload::load(&self.payload) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to load payload: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        let terminology = StaticTerminology::new(config.terminology.target_system.clone());
        let coordinator =
            BatchCoordinator::new(config, Arc::new(MemoryStore::new()), Arc::new(terminology));

        match coordinator.detect_version(&payload) {
            Ok(determination) => {
                println!("🔍 Schema version: {}", determination.version);
                println!();
                for (file, compatible) in &determination.per_file {
                    let versions: Vec<&str> = compatible.iter().map(|v| v.as_str()).collect();
                    println!(
                        "  {} ({}): {}",
                        file.path.display(),
                        file.type_tag,
                        versions.join(", ")
                    );
                }
                let remaining: Vec<&str> =
                    determination.remaining.iter().map(|v| v.as_str()).collect();
                println!();
                println!("  Compatible with every file: {}", remaining.join(", "));
                Ok(0)
            }
            Err(e) => {
                crate::log_error_with_context!(&e, "Version discovery failed");
                println!("❌ Version discovery failed");
                println!("   Error: {e}");
                Ok(exit_code_for(&e))
            }
        }
    }
}
