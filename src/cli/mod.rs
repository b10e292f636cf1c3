//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Tributary using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tributary - clinical vendor extract ETL
#[derive(Parser, Debug)]
#[command(name = "tributary")]
#[command(version, about, long_about = None)]
#[command(author = "Tributary Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tributary.toml", env = "TRIBUTARY_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TRIBUTARY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transform one extract payload and file the resources
    Transform(commands::transform::TransformArgs),

    /// Report which schema version a payload's headers resolve to
    DetectVersion(commands::detect_version::DetectVersionArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_transform() {
        let cli = Cli::parse_from(["tributary", "transform", "/data/extract"]);
        assert_eq!(cli.config, "tributary.toml");
        match cli.command {
            Commands::Transform(args) => {
                assert_eq!(args.payload, std::path::PathBuf::from("/data/extract"));
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config_and_log_level() {
        let cli = Cli::parse_from([
            "tributary",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
            "validate-config",
        ]);
        assert_eq!(cli.config, "custom.toml");
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_detect_version() {
        let cli = Cli::parse_from(["tributary", "detect-version", "manifest.json"]);
        assert!(matches!(cli.command, Commands::DetectVersion(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["tributary", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
