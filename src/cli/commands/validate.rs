//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Tributary configuration file.

use crate::config::load_config;
use crate::config::schema::{FilerTarget, TerminologyMode};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as well; a failure here covers both
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Vendor: {}", config.source.vendor);
        match &config.source.version {
            Some(version) => println!("  Schema Version: {version} (declared)"),
            None if config.source.candidate_versions.is_empty() => {
                println!("  Schema Version: discovered from all known versions")
            }
            None => println!(
                "  Schema Version: discovered from {}",
                config.source.candidate_versions.join(", ")
            ),
        }
        println!("  Lookup Workers: {}", config.transform.lookup_workers);
        println!("  Delete Pre-pass: {}", config.transform.prepass_deletes);
        println!("  Date Overrides: {}", config.transform.date_overrides.len());

        match config.filer.target {
            FilerTarget::Memory => println!("  Store: memory"),
            FilerTarget::Json => {
                println!("  Store: json ({})", config.filer.json_directory)
            }
            FilerTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    let connection: &str = pg_config.connection_string.expose_secret().as_ref();
                    println!("  Store: postgresql");
                    println!(
                        "  PostgreSQL Connection: {}",
                        connection.rsplit('@').next().unwrap_or("***")
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }
        println!("  Filer Queues: {}", config.filer.queues);

        match config.terminology.mode {
            TerminologyMode::Static => println!(
                "  Terminology: static ({} mapping(s))",
                config.terminology.mappings.len()
            ),
            TerminologyMode::Fhir => println!(
                "  Terminology: fhir ({})",
                config.terminology.fhir_base_url.as_deref().unwrap_or("")
            ),
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_valid_config_exits_zero() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[filer]\ntarget = \"memory\"").unwrap();
        let args = ValidateArgs {};
        let path = file.path().to_string_lossy().to_string();
        assert_eq!(args.execute(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_exits_two() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[filer]\nqueues = 0").unwrap();
        let args = ValidateArgs {};
        let path = file.path().to_string_lossy().to_string();
        assert_eq!(args.execute(&path).await.unwrap(), 2);
    }
}
