//! JSON directory resource store
//!
//! Each resource is one pretty-printed JSON document at
//! `{root}/{ResourceType}/{encoded key}.json`. Identities are kept beside the
//! documents in `{root}/.identity/{ResourceType}/{encoded key}` and are never
//! removed, so a deleted resource that is filed again keeps its id.

use super::traits::ResourceStore;
use crate::domain::{CompositeKey, Resource, ResourceType, Result, TributaryError};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const IDENTITY_DIR: &str = ".identity";

/// Resource store writing one JSON file per resource
pub struct JsonDirectoryStore {
    root: PathBuf,
}

impl JsonDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, resource_type: ResourceType, key: &CompositeKey) -> PathBuf {
        self.root
            .join(resource_type.as_str())
            .join(format!("{}.json", encode_key(key)))
    }

    fn identity_path(&self, resource_type: ResourceType, key: &CompositeKey) -> PathBuf {
        self.root
            .join(IDENTITY_DIR)
            .join(resource_type.as_str())
            .join(encode_key(key))
    }

    async fn identity_for(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<Uuid> {
        let path = self.identity_path(resource_type, key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Uuid::parse_str(text.trim()).map_err(|e| {
                TributaryError::Filer(format!("Corrupt identity file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let id = Uuid::new_v4();
                write_file(&path, id.to_string().as_bytes()).await?;
                Ok(id)
            }
            Err(e) => Err(TributaryError::Io(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write then rename so a reader never sees a partial document.
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Encodes a composite key as a file name
///
/// ASCII alphanumerics, `-` and `.` pass through, everything else becomes
/// `%XX`, so distinct keys never share a file.
fn encode_key(key: &CompositeKey) -> String {
    let mut out = String::new();
    for byte in key.to_string().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl ResourceStore for JsonDirectoryStore {
    async fn test_connection(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let metadata = tokio::fs::metadata(&self.root).await?;
        if metadata.permissions().readonly() {
            return Err(TributaryError::Filer(format!(
                "Store directory {} is read-only",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join(IDENTITY_DIR)).await?;
        tracing::info!(root = %self.root.display(), "JSON resource store initialized");
        Ok(())
    }

    async fn upsert(&self, mut resource: Resource) -> Result<Resource> {
        let id = self
            .identity_for(resource.resource_type, &resource.source_key)
            .await?;
        resource.id = Some(id);
        resource.last_updated = Some(Utc::now());

        let path = self.document_path(resource.resource_type, &resource.source_key);
        let json = serde_json::to_vec_pretty(&resource)?;
        write_file(&path, &json).await?;
        Ok(resource)
    }

    async fn delete(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        let path = self.document_path(resource_type, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TributaryError::Io(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn get(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<Option<Resource>> {
        let path = self.document_path(resource_type, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TributaryError::Io(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn exists(&self, resource_type: ResourceType, key: &CompositeKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.document_path(resource_type, key)).await?)
    }

    async fn count(&self, resource_type: ResourceType) -> Result<usize> {
        let dir = self.root.join(resource_type.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn store_name(&self) -> &str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn patient(local: &str) -> Resource {
        Resource::builder(ResourceType::Patient)
            .source_key(CompositeKey::new("ORG1", local).unwrap())
            .field("gender", json!("female"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_encode_key_is_injective_for_separators() {
        let a = CompositeKey::new("a", "b_c").unwrap();
        let b = CompositeKey::new("a_b", "c").unwrap();
        assert_ne!(encode_key(&a), encode_key(&b));
        assert_eq!(encode_key(&a), "a%3Ab%5Fc");
    }

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirectoryStore::new(dir.path());
        store.ensure_schema().await.unwrap();

        let saved = store.upsert(patient("P1")).await.unwrap();
        let key = saved.source_key.clone();
        let loaded = store.get(ResourceType::Patient, &key).await.unwrap().unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.field("gender"), Some(&json!("female")));
        assert_eq!(store.count(ResourceType::Patient).await.unwrap(), 1);

        assert!(store.delete(ResourceType::Patient, &key).await.unwrap());
        assert!(!store.exists(ResourceType::Patient, &key).await.unwrap());
        assert!(!store.delete(ResourceType::Patient, &key).await.unwrap());

        let again = store.upsert(patient("P1")).await.unwrap();
        assert_eq!(again.id, saved.id);
    }
}
