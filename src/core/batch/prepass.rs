//! Delete pre-pass
//!
//! Vendors re-send delete markers for records that were never delivered as
//! live records. Before the transform passes, every deleted record's key is
//! collected and looked up in the store; the transformers later skip deletes
//! for keys the store has never seen.

use super::pool::LookupPool;
use crate::adapters::exchange::ExchangeFile;
use crate::adapters::store::ResourceStore;
use crate::core::parse::FormatDispatcher;
use crate::core::transform::{is_deleted, transformer_for};
use crate::domain::{CompositeKey, ResourceType, Result, SchemaVersion, TributaryError};
use std::collections::HashSet;
use std::sync::Arc;

/// Keys present in the store before the batch started
pub type FiledKeys = HashSet<(ResourceType, CompositeKey)>;

/// Collects the keys of every record marked deleted, in delivery order
///
/// Rows that cannot be read, and records whose key or delete indicator cannot
/// be read, are left for the transform pass to report.
///
/// # Errors
///
/// Returns [`TributaryError::UnknownFileType`] for a tag without a transformer
/// and any error raised opening or reading a file.
pub fn collect_deleted_keys(
    dispatcher: &FormatDispatcher,
    files: &[ExchangeFile],
    version: &SchemaVersion,
) -> Result<Vec<(ResourceType, CompositeKey)>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for file in files {
        let transformer =
            transformer_for(&file.type_tag).ok_or_else(|| TributaryError::UnknownFileType {
                type_tag: file.type_tag.clone(),
                path: file.path.display().to_string(),
            })?;
        let resource_type = transformer.resource_type();

        let mut cursor = dispatcher.open(file, version)?;
        let mut deleted = 0usize;
        loop {
            match cursor.next() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(TributaryError::Record(e)) => {
                    tracing::debug!(
                        file = %file.path.display(),
                        row = e.provenance.row,
                        error = %e.message,
                        "Pre-pass skipped an unreadable row"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
            let key = match is_deleted(cursor.as_ref()) {
                Ok(true) => transformer.record_key(cursor.as_ref()),
                Ok(false) => continue,
                Err(e) => Err(e),
            };
            match key {
                Ok(key) => {
                    deleted += 1;
                    if seen.insert((resource_type, key.clone())) {
                        keys.push((resource_type, key));
                    }
                }
                Err(e) => tracing::debug!(
                    file = %file.path.display(),
                    error = %e,
                    "Pre-pass skipped an unreadable record"
                ),
            }
        }
        cursor.close();

        tracing::debug!(
            file = %file.path.display(),
            file_type = %file.type_tag,
            deleted,
            "Collected deleted keys"
        );
    }

    Ok(keys)
}

/// Looks every key up in the store and returns those that exist
pub async fn find_filed(
    store: Arc<dyn ResourceStore + Send + Sync>,
    pool: &LookupPool,
    keys: Vec<(ResourceType, CompositeKey)>,
) -> Result<FiledKeys> {
    let checked = keys.len();
    let results = pool
        .run_all(keys, move |(resource_type, key)| {
            let store = store.clone();
            async move {
                let exists = store.exists(resource_type, &key).await?;
                Ok((resource_type, key, exists))
            }
        })
        .await?;

    let filed: FiledKeys = results
        .into_iter()
        .filter(|(_, _, exists)| *exists)
        .map(|(resource_type, key, _)| (resource_type, key))
        .collect();

    tracing::info!(
        checked,
        filed = filed.len(),
        workers = pool.workers(),
        "Delete pre-pass complete"
    );
    Ok(filed)
}
