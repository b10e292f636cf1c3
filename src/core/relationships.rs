//! Deferred relationship cache
//!
//! Child records (observations, medications) may be delivered before, after,
//! or in a different file than the parent record they reference. The cache
//! holds child references per owner key until the owner is transformed, when
//! they are drained into the owner's links. References still pending at the end
//! of a batch are applied to owners already in the store.
//!
//! Each pending entry moves `pending -> applied` exactly once: a drained entry
//! is gone, and a second drain returns nothing. Owners check
//! [`RelationshipCache::has_pending`] before draining.

use crate::adapters::filer::ResourceFiler;
use crate::domain::{
    CompositeKey, RecordProvenance, ResourceLink, ResourceType, Result,
};
use serde::Serialize;
use std::collections::HashMap;

/// File name used in the provenance of end-of-batch link updates
pub const DEFERRED_LINKS_SOURCE: &str = "<deferred links>";

/// A child waiting to be linked to its owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildReference {
    pub resource_type: ResourceType,
    pub key: CompositeKey,
}

impl ChildReference {
    pub fn new(resource_type: ResourceType, key: CompositeKey) -> Self {
        Self { resource_type, key }
    }
}

impl From<ChildReference> for ResourceLink {
    fn from(child: ChildReference) -> Self {
        ResourceLink::new(child.resource_type, child.key)
    }
}

/// Outcome of [`RelationshipCache::apply_remaining_to_store`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Owners found in the store and re-saved
    pub applied_owners: usize,
    /// Links added to those owners
    pub applied_children: usize,
    /// Owners not found in the store
    pub dropped_owners: usize,
    /// Child references discarded with their missing owner
    pub dropped_children: usize,
}

/// Pending owner -> children map for one owner resource type
#[derive(Debug)]
pub struct RelationshipCache {
    owner_type: ResourceType,
    pending: HashMap<CompositeKey, Vec<ChildReference>>,
}

impl RelationshipCache {
    pub fn new(owner_type: ResourceType) -> Self {
        Self {
            owner_type,
            pending: HashMap::new(),
        }
    }

    pub fn owner_type(&self) -> ResourceType {
        self.owner_type
    }

    /// Record that `child` should be linked to `owner`
    pub fn record_pending_child(&mut self, owner: CompositeKey, child: ChildReference) {
        tracing::trace!(
            owner = %owner,
            child = %child.key,
            "Recorded pending child"
        );
        self.pending.entry(owner).or_default().push(child);
    }

    /// Returns true if any child is waiting for `owner`
    pub fn has_pending(&self, owner: &CompositeKey) -> bool {
        self.pending.contains_key(owner)
    }

    /// Remove and return every child pending for `owner`
    pub fn drain_pending(&mut self, owner: &CompositeKey) -> Vec<ChildReference> {
        self.pending.remove(owner).unwrap_or_default()
    }

    pub fn pending_owner_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_child_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Link every remaining child to its owner in the store
    ///
    /// Owners are processed in key order. An owner that was never filed is
    /// dropped together with its children; this is logged at debug level and
    /// counted, never raised. The cache is empty afterwards.
    ///
    /// # Errors
    ///
    /// Store and filer errors propagate. Owners not yet processed when an error
    /// occurs stay pending.
    pub async fn apply_remaining_to_store(&mut self, filer: &ResourceFiler) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        let mut owners: Vec<CompositeKey> = self.pending.keys().cloned().collect();
        owners.sort();

        for owner in owners {
            let Some(existing) = filer.load_resource(self.owner_type, &owner).await? else {
                let dropped = self.drain_pending(&owner);
                tracing::debug!(
                    owner_type = %self.owner_type,
                    owner = %owner,
                    children = dropped.len(),
                    "Owner not found in store, dropping pending children"
                );
                report.dropped_owners += 1;
                report.dropped_children += dropped.len();
                continue;
            };

            let children = self.drain_pending(&owner);
            let mut resource = existing;
            let added = children
                .into_iter()
                .filter(|child| resource.add_link(child.clone().into()))
                .count();

            if added > 0 {
                let provenance =
                    RecordProvenance::new(DEFERRED_LINKS_SOURCE, self.owner_type.as_str(), 0);
                if self.owner_type.is_admin() {
                    filer.save_admin_resource(provenance, resource).await?;
                } else {
                    filer.save_patient_resource(provenance, resource).await?;
                }
            }
            report.applied_owners += 1;
            report.applied_children += added;
        }

        tracing::debug!(
            owner_type = %self.owner_type,
            applied_owners = report.applied_owners,
            applied_children = report.applied_children,
            dropped_owners = report.dropped_owners,
            "Applied deferred relationships"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::{MemoryStore, ResourceStore};
    use crate::domain::Resource;
    use std::sync::Arc;

    fn key(scope: &str, id: &str) -> CompositeKey {
        CompositeKey::new(scope, id).unwrap()
    }

    fn observation(id: &str) -> ChildReference {
        ChildReference::new(ResourceType::Observation, key("P1", id))
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut cache = RelationshipCache::new(ResourceType::Condition);
        let owner = key("P1", "PR1");
        cache.record_pending_child(owner.clone(), observation("OBS1"));
        cache.record_pending_child(owner.clone(), observation("OBS2"));

        assert!(cache.has_pending(&owner));
        assert_eq!(cache.pending_child_count(), 2);
        assert_eq!(cache.drain_pending(&owner).len(), 2);
        assert!(cache.drain_pending(&owner).is_empty());
        assert!(!cache.has_pending(&owner));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_same_local_id_under_different_scope_is_distinct() {
        let mut cache = RelationshipCache::new(ResourceType::Condition);
        cache.record_pending_child(key("P1", "PR1"), observation("OBS1"));
        cache.record_pending_child(key("P2", "PR1"), observation("OBS2"));
        assert_eq!(cache.pending_owner_count(), 2);
        assert_eq!(cache.drain_pending(&key("P1", "PR1")), vec![observation("OBS1")]);
    }

    #[tokio::test]
    async fn test_apply_remaining_links_and_tolerates_missing_owner() {
        let store = Arc::new(MemoryStore::new());
        let problem = Resource::builder(ResourceType::Condition)
            .source_key(key("P1", "PR1"))
            .patient(key("ORG1", "P1"))
            .link(ResourceLink::new(ResourceType::Observation, key("P1", "OBS1")))
            .build()
            .unwrap();
        store.upsert(problem).await.unwrap();
        let filer = ResourceFiler::new(store.clone(), 2);

        let mut cache = RelationshipCache::new(ResourceType::Condition);
        cache.record_pending_child(key("P1", "PR1"), observation("OBS1"));
        cache.record_pending_child(key("P1", "PR1"), observation("OBS2"));
        cache.record_pending_child(key("P1", "MISSING"), observation("OBS3"));

        let report = cache.apply_remaining_to_store(&filer).await.unwrap();
        filer.wait_to_finish().await.unwrap();
        filer.fail_if_any_errors().unwrap();

        assert_eq!(
            report,
            ApplyReport {
                applied_owners: 1,
                applied_children: 1,
                dropped_owners: 1,
                dropped_children: 1,
            }
        );
        assert!(cache.is_empty());

        let stored = store
            .get(ResourceType::Condition, &key("P1", "PR1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.links.len(), 2);
        assert!(stored.has_link(ResourceType::Observation, &key("P1", "OBS2")));
    }
}
