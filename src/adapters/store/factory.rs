//! Resource store factory
//!
//! This module creates the resource store selected by `filer.target`.

use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::store::json::JsonDirectoryStore;
use crate::adapters::store::memory::MemoryStore;
use crate::adapters::store::traits::ResourceStore;
use crate::config::schema::{FilerTarget, TributaryConfig};
use crate::domain::{Result, TributaryError};
use std::sync::Arc;

/// Create a resource store based on the configuration
///
/// # Arguments
///
/// * `config` - The Tributary configuration
///
/// # Returns
///
/// Returns an Arc-wrapped trait object that implements ResourceStore
///
/// # Errors
///
/// Returns an error if the store client cannot be created, or if the
/// PostgreSQL section is missing for the PostgreSQL target
pub async fn create_store(config: &TributaryConfig) -> Result<Arc<dyn ResourceStore + Send + Sync>> {
    match config.filer.target {
        FilerTarget::Memory => {
            tracing::info!("Creating in-memory resource store");
            Ok(Arc::new(MemoryStore::new()) as Arc<dyn ResourceStore + Send + Sync>)
        }
        FilerTarget::Json => {
            tracing::info!(
                directory = %config.filer.json_directory,
                "Creating JSON directory resource store"
            );
            let store = JsonDirectoryStore::new(&config.filer.json_directory);
            Ok(Arc::new(store) as Arc<dyn ResourceStore + Send + Sync>)
        }
        FilerTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                TributaryError::Configuration(
                    "postgresql configuration is required when filer.target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL resource store");
            let client = PostgreSQLClient::new(pg_config.clone()).await?;
            let adapter = PostgreSQLAdapter::new(client);

            Ok(Arc::new(adapter) as Arc<dyn ResourceStore + Send + Sync>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_creates_memory_store() {
        let config = TributaryConfig::default();
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.store_name(), "memory");
    }

    #[tokio::test]
    async fn test_json_target_creates_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TributaryConfig::default();
        config.filer.target = FilerTarget::Json;
        config.filer.json_directory = dir.path().display().to_string();

        let store = create_store(&config).await.unwrap();
        assert_eq!(store.store_name(), "json");
    }

    #[tokio::test]
    async fn test_postgresql_without_section_is_configuration_error() {
        let mut config = TributaryConfig::default();
        config.filer.target = FilerTarget::PostgreSQL;
        let result = create_store(&config).await;
        assert!(matches!(result, Err(TributaryError::Configuration(_))));
    }
}
