//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{FilerTarget, TerminologyMode, TributaryConfig};
use super::secret::secret_string;
use crate::domain::errors::TributaryError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into TributaryConfig
/// 4. Applies environment variable overrides (TRIBUTARY_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use tributary::config::loader::load_config;
///
/// let config = load_config("tributary.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TributaryConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TributaryError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        TributaryError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration from TOML text
///
/// Applies the same substitution, overrides and validation as [`load_config`].
pub fn parse_config(contents: &str) -> Result<TributaryConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: TributaryConfig = toml::from_str(&contents)
        .map_err(|e| TributaryError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        TributaryError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TributaryError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(TributaryError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        TributaryError::Configuration(format!("Invalid value '{value}' for {name}"))
    })
}

fn list_override(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Applies environment variable overrides using the TRIBUTARY_* prefix
///
/// Environment variables follow the pattern TRIBUTARY_<SECTION>_<KEY>, for
/// example TRIBUTARY_SOURCE_VERSION or TRIBUTARY_FILER_TARGET. List values are
/// comma separated.
fn apply_env_overrides(config: &mut TributaryConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("TRIBUTARY_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_APPLICATION_DRY_RUN") {
        config.application.dry_run = parse_override("TRIBUTARY_APPLICATION_DRY_RUN", &val)?;
    }

    // Source overrides
    if let Ok(val) = std::env::var("TRIBUTARY_SOURCE_VENDOR") {
        config.source.vendor = val;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_SOURCE_VERSION") {
        config.source.version = Some(val).filter(|v| !v.trim().is_empty());
    }
    if let Ok(val) = std::env::var("TRIBUTARY_SOURCE_CANDIDATE_VERSIONS") {
        config.source.candidate_versions = list_override(&val);
    }

    // Transform overrides
    if let Ok(val) = std::env::var("TRIBUTARY_TRANSFORM_LOOKUP_WORKERS") {
        config.transform.lookup_workers =
            parse_override("TRIBUTARY_TRANSFORM_LOOKUP_WORKERS", &val)?;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_TRANSFORM_PREPASS_DELETES") {
        config.transform.prepass_deletes =
            parse_override("TRIBUTARY_TRANSFORM_PREPASS_DELETES", &val)?;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_TRANSFORM_FAIL_FAST") {
        config.transform.fail_fast = list_override(&val);
    }

    // Filer overrides
    if let Ok(val) = std::env::var("TRIBUTARY_FILER_TARGET") {
        config.filer.target = match val.to_ascii_lowercase().as_str() {
            "memory" => FilerTarget::Memory,
            "json" => FilerTarget::Json,
            "postgresql" => FilerTarget::PostgreSQL,
            other => {
                return Err(TributaryError::Configuration(format!(
                    "Invalid TRIBUTARY_FILER_TARGET '{other}'. Must be one of: memory, json, postgresql"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("TRIBUTARY_FILER_QUEUES") {
        config.filer.queues = parse_override("TRIBUTARY_FILER_QUEUES", &val)?;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_FILER_JSON_DIRECTORY") {
        config.filer.json_directory = val;
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("TRIBUTARY_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("TRIBUTARY_POSTGRESQL_MAX_CONNECTIONS") {
            pg_config.max_connections =
                parse_override("TRIBUTARY_POSTGRESQL_MAX_CONNECTIONS", &val)?;
        }
        if let Ok(val) = std::env::var("TRIBUTARY_POSTGRESQL_SSL_MODE") {
            pg_config.ssl_mode = val;
        }
    }

    // Terminology overrides
    if let Ok(val) = std::env::var("TRIBUTARY_TERMINOLOGY_MODE") {
        config.terminology.mode = match val.to_ascii_lowercase().as_str() {
            "static" => TerminologyMode::Static,
            "fhir" => TerminologyMode::Fhir,
            other => {
                return Err(TributaryError::Configuration(format!(
                    "Invalid TRIBUTARY_TERMINOLOGY_MODE '{other}'. Must be one of: static, fhir"
                )))
            }
        };
    }
    if let Ok(val) = std::env::var("TRIBUTARY_TERMINOLOGY_FHIR_BASE_URL") {
        config.terminology.fhir_base_url = Some(val);
    }
    if let Ok(val) = std::env::var("TRIBUTARY_TERMINOLOGY_TLS_VERIFY") {
        config.terminology.tls_verify = parse_override("TRIBUTARY_TERMINOLOGY_TLS_VERIFY", &val)?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("TRIBUTARY_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("TRIBUTARY_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("TRIBUTARY_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests in this module mutate process environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_substitute_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("TRIBUTARY_TEST_VAR", "test_value");
        let input = "password = \"${TRIBUTARY_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"\n");
        std::env::remove_var("TRIBUTARY_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("TRIBUTARY_MISSING_VAR");
        let input = "password = \"${TRIBUTARY_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("TRIBUTARY_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("TRIBUTARY_COMMENTED_VAR");
        let input = "# url = \"${TRIBUTARY_COMMENTED_VAR}\"";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[application]
log_level = "debug"

[source]
candidate_versions = ["5.3", "5.1"]

[transform]
lookup_workers = 4

[[transform.date_overrides]]
organisation = "ORG-1"
earliest_valid_date = "1990-01-01"

[filer]
target = "json"
json_directory = "/tmp/tributary-filed"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.source.candidate_versions, vec!["5.3", "5.1"]);
        assert_eq!(config.transform.date_overrides.len(), 1);
        assert_eq!(config.filer.target, FilerTarget::Json);
    }

    #[test]
    fn test_env_override_wins_over_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("TRIBUTARY_SOURCE_VERSION", "5.1");
        std::env::set_var("TRIBUTARY_TRANSFORM_FAIL_FAST", "CareRecord_Problem, Prescribing_Medication");

        let config = parse_config("[source]\nversion = \"5.3\"\n");

        std::env::remove_var("TRIBUTARY_SOURCE_VERSION");
        std::env::remove_var("TRIBUTARY_TRANSFORM_FAIL_FAST");

        let config = config.unwrap();
        assert_eq!(config.source.version.as_deref(), Some("5.1"));
        assert_eq!(
            config.transform.fail_fast,
            vec!["CareRecord_Problem", "Prescribing_Medication"]
        );
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("TRIBUTARY_FILER_QUEUES", "many");
        let result = parse_config("");
        std::env::remove_var("TRIBUTARY_FILER_QUEUES");
        assert!(matches!(result, Err(TributaryError::Configuration(_))));
    }
}
