// Tributary - Clinical Extract ETL Tool
// Copyright (c) 2025 Tributary Contributors
// Licensed under the MIT License

use clap::Parser;
use std::process;
use tributary::cli::{Cli, Commands};
use tributary::config::{load_config, LoggingConfig};
use tributary::logging::init_logging;

#[tokio::main]
async fn main() {
    // Optional; a missing .env is ignored
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // The file layer follows the config when it loads; commands report
    // config errors themselves
    let loaded = load_config(&cli.config).ok();
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().map(|c| c.application.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let logging_config = match (&cli.command, loaded) {
        (Commands::Transform(_), Some(config)) => config.logging,
        _ => LoggingConfig {
            local_enabled: false,
            local_path: String::new(),
            local_rotation: "daily".to_string(),
            local_max_size_mb: 100,
        },
    };
    let _guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Tributary - Clinical Extract ETL Tool"
    );

    let result = match cli.command {
        Commands::Transform(args) => args.execute(&cli.config).await,
        Commands::DetectVersion(args) => args.execute(&cli.config).await,
        Commands::ValidateConfig(args) => args.execute(&cli.config).await,
        Commands::Init(args) => args.execute().await,
    };

    match result {
        Ok(exit_code) => {
            if exit_code != 0 {
                tracing::warn!(exit_code, "Command completed with non-zero exit code");
            }
            process::exit(exit_code);
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            process::exit(5);
        }
    }
}
