//! Shared state of one transform batch

use super::overrides::DateOverrides;
use crate::adapters::filer::ResourceFiler;
use crate::adapters::terminology::TerminologyService;
use crate::core::relationships::RelationshipCache;
use crate::domain::{Coding, CompositeKey, ResourceType, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Collaborators and batch-scoped state handed to every transformer
///
/// Owned by the single processing task; nothing here is shared across tasks
/// except the filer's queues and the terminology service.
pub struct TransformContext {
    pub filer: ResourceFiler,
    pub terminology: Arc<dyn TerminologyService + Send + Sync>,
    /// Children waiting for their problem
    pub problem_links: RelationshipCache,
    pub date_overrides: DateOverrides,
    /// Keys known to be filed; `None` when the delete pre-pass did not run
    filed: Option<HashSet<(ResourceType, CompositeKey)>>,
}

impl TransformContext {
    pub fn new(
        filer: ResourceFiler,
        terminology: Arc<dyn TerminologyService + Send + Sync>,
        date_overrides: DateOverrides,
    ) -> Self {
        Self {
            filer,
            terminology,
            problem_links: RelationshipCache::new(ResourceType::Condition),
            date_overrides,
            filed: None,
        }
    }

    /// Seed the keys the delete pre-pass found in the store
    pub fn with_filed_keys(mut self, keys: HashSet<(ResourceType, CompositeKey)>) -> Self {
        self.filed = Some(keys);
        self
    }

    /// Returns false only when the pre-pass ran and the key was never filed
    pub fn should_delete(&self, resource_type: ResourceType, key: &CompositeKey) -> bool {
        match &self.filed {
            Some(filed) => filed.contains(&(resource_type, key.clone())),
            None => true,
        }
    }

    /// Note a key filed during this batch, so a later delete of it is applied
    pub fn mark_filed(&mut self, resource_type: ResourceType, key: &CompositeKey) {
        if let Some(filed) = self.filed.as_mut() {
            filed.insert((resource_type, key.clone()));
        }
    }

    pub fn mark_deleted(&mut self, resource_type: ResourceType, key: &CompositeKey) {
        if let Some(filed) = self.filed.as_mut() {
            filed.remove(&(resource_type, key.clone()));
        }
    }

    /// Translate a vendor code and render it as a concept
    ///
    /// The vendor coding is always kept; the translated coding, when there is
    /// one, comes first. Returns the concept and whether a translation was found.
    pub async fn concept(
        &self,
        scheme: &str,
        code: &str,
        term: Option<&str>,
    ) -> Result<(Value, Option<Coding>)> {
        let translated = self.terminology.translate(scheme, code).await?;

        let mut codings = Vec::with_capacity(2);
        if let Some(coding) = &translated {
            codings.push(serde_json::to_value(coding)?);
        }
        let mut vendor = json!({ "system": scheme, "code": code });
        if let Some(term) = term {
            vendor["display"] = json!(term);
        }
        if translated.as_ref().map(|c| c.code.as_str()) != Some(code) {
            codings.push(vendor);
        }

        let mut concept = json!({ "coding": codings });
        if let Some(term) = term {
            concept["text"] = json!(term);
        }
        Ok((concept, translated))
    }
}
