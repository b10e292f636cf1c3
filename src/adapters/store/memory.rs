//! In-memory resource store
//!
//! Used for dry runs and tests. Resources live for the lifetime of the process.

use super::traits::ResourceStore;
use crate::domain::{CompositeKey, Resource, ResourceType, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

type StoreKey = (ResourceType, CompositeKey);

/// Write operation observed by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Upsert(ResourceType, CompositeKey),
    Delete(ResourceType, CompositeKey),
}

#[derive(Default)]
struct Inner {
    resources: HashMap<StoreKey, Resource>,
    identities: HashMap<StoreKey, Uuid>,
    journal: Vec<StoreOperation>,
}

/// Resource store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every write applied so far, in order
    pub fn journal(&self) -> Vec<StoreOperation> {
        self.inner
            .read()
            .map(|inner| inner.journal.clone())
            .unwrap_or_default()
    }

    /// Number of reads served (`get` and `exists`)
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn poisoned() -> crate::domain::TributaryError {
        crate::domain::TributaryError::Filer("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, mut resource: Resource) -> Result<Resource> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let key = (resource.resource_type, resource.source_key.clone());
        let id = *inner.identities.entry(key.clone()).or_insert_with(Uuid::new_v4);

        resource.id = Some(id);
        resource.last_updated = Some(Utc::now());
        inner
            .journal
            .push(StoreOperation::Upsert(key.0, key.1.clone()));
        inner.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn delete(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        inner
            .journal
            .push(StoreOperation::Delete(resource_type, key.clone()));
        Ok(inner
            .resources
            .remove(&(resource_type, key.clone()))
            .is_some())
    }

    async fn get(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<Option<Resource>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.resources.get(&(resource_type, key.clone())).cloned())
    }

    async fn count(&self, resource_type: ResourceType) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .resources
            .keys()
            .filter(|(rt, _)| *rt == resource_type)
            .count())
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(local: &str) -> Resource {
        Resource::builder(ResourceType::Condition)
            .source_key(CompositeKey::new("P1", local).unwrap())
            .patient(CompositeKey::new("ORG1", "P1").unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_identity_is_stable_across_delete() {
        let store = MemoryStore::new();
        let first = store.upsert(condition("PR1")).await.unwrap();
        let key = first.source_key.clone();

        assert!(store.delete(ResourceType::Condition, &key).await.unwrap());
        assert!(!store.exists(ResourceType::Condition, &key).await.unwrap());

        let again = store.upsert(condition("PR1")).await.unwrap();
        assert_eq!(first.id, again.id);
        assert!(again.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let store = MemoryStore::new();
        let key = CompositeKey::new("P1", "nope").unwrap();
        assert!(!store.delete(ResourceType::Condition, &key).await.unwrap());
        assert_eq!(store.journal().len(), 1);
    }

    #[tokio::test]
    async fn test_count_by_type() {
        let store = MemoryStore::new();
        store.upsert(condition("PR1")).await.unwrap();
        store.upsert(condition("PR2")).await.unwrap();
        assert_eq!(store.count(ResourceType::Condition).await.unwrap(), 2);
        assert_eq!(store.count(ResourceType::Observation).await.unwrap(), 0);
    }
}
