//! Configuration management for Tributary.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Tributary uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `TRIBUTARY_<SECTION>_<KEY>` environment overrides
//! - Default values for every optional setting
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tributary::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tributary.toml")?;
//! println!("Filing to: {:?}", config.filer.target);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - log level and dry run
//! - [`SourceConfig`] - vendor and schema version (declared or discovered)
//! - [`TransformConfig`] - lookup pool size, fail-fast file types, date overrides
//! - [`FilerConfig`] - resource store and worker queues
//! - [`PostgreSQLConfig`] - PostgreSQL store connection
//! - [`TerminologyConfig`] - static mappings or FHIR terminology server
//! - [`LoggingConfig`] - local JSON log files
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [source]
//! candidate_versions = ["5.3", "5.1", "5.0"]
//!
//! [[transform.date_overrides]]
//! organisation = "B1F5E4F1-0001"
//! earliest_valid_date = "1990-01-01"
//!
//! [filer]
//! target = "postgresql"
//!
//! [postgresql]
//! connection_string = "${TRIBUTARY_PG_URL}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CodeMappingConfig, DateOverrideConfig, Environment, FilerConfig,
    FilerTarget, LoggingConfig, PostgreSQLConfig, SourceConfig, TerminologyConfig,
    TerminologyMode, TransformConfig, TributaryConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
