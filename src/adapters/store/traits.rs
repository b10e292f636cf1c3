//! Resource store abstraction
//!
//! This module defines the trait that durable resource stores implement to be
//! used by the resource filer.

use crate::domain::{CompositeKey, Resource, ResourceType, Result};
use async_trait::async_trait;

/// Durable store for target resources
///
/// Stores own identity mapping: the first time a (resource type, source key)
/// pair is filed it is assigned a stable UUID, and every later upsert of the
/// same pair, including one after a delete, reuses it. Stores also stamp
/// `last_updated` on every write.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Test the connection to the store
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn test_connection(&self) -> Result<()>;

    /// Ensure the store's schema or directory layout exists
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert or replace a resource
    ///
    /// # Returns
    ///
    /// Returns the stored resource with its identity and `last_updated` set.
    async fn upsert(&self, resource: Resource) -> Result<Resource>;

    /// Delete a resource
    ///
    /// # Returns
    ///
    /// Returns `true` if a resource was deleted, `false` if none was stored.
    async fn delete(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool>;

    /// Load a resource by type and source key
    async fn get(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<Option<Resource>>;

    /// Check whether a resource is stored
    async fn exists(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        Ok(self.get(resource_type, key).await?.is_some())
    }

    /// Count stored resources of one type
    async fn count(&self, resource_type: ResourceType) -> Result<usize>;

    /// Get the store name
    fn store_name(&self) -> &str;
}
