//! Batch schema version determination
//!
//! A batch either declares its version, in which case every header is checked
//! against it when the cursors open, or runs discovery: each file's header
//! narrows a ranked candidate list and the highest ranked survivor becomes the
//! version of every file in the batch.

use super::cursor::HeaderSample;
use super::dispatch::FormatDispatcher;
use crate::adapters::exchange::ExchangeFile;
use crate::domain::{Result, SchemaVersion, TributaryError};

/// How the batch version is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelection {
    /// The version is declared by configuration
    Declared(SchemaVersion),
    /// The version is discovered from the headers, preferring earlier candidates
    Discover(Vec<SchemaVersion>),
}

/// Outcome of version discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDetermination {
    /// The version assigned to every file of the batch
    pub version: SchemaVersion,

    /// Every candidate still compatible after all files, in rank order
    pub remaining: Vec<SchemaVersion>,

    /// Candidates compatible with each file on its own, in delivery order
    pub per_file: Vec<(ExchangeFile, Vec<SchemaVersion>)>,
}

/// Determines the single version of a batch by intersecting per-file candidates
///
/// # Errors
///
/// Returns [`TributaryError::SchemaVersion`] naming the file that eliminated the
/// last candidate, and [`TributaryError::UnknownFileType`] for an unregistered tag.
pub fn determine_version(
    dispatcher: &FormatDispatcher,
    files: &[ExchangeFile],
    candidates: &[SchemaVersion],
) -> Result<VersionDetermination> {
    if candidates.is_empty() {
        return Err(TributaryError::SchemaVersion(
            "No candidate versions to test".to_string(),
        ));
    }

    let registry = dispatcher.registry();
    let mut remaining = candidates.to_vec();
    let mut per_file = Vec::with_capacity(files.len());

    for file in files {
        let sample = dispatcher.read_header(file)?;
        let compatible = match &sample {
            HeaderSample::Named(header) => {
                registry.compatible_versions(&file.type_tag, candidates, header)
            }
            HeaderSample::Width(width) => {
                registry.compatible_versions_by_width(&file.type_tag, candidates, *width)
            }
        };

        tracing::debug!(
            file = %file.path.display(),
            file_type = %file.type_tag,
            compatible = ?compatible.iter().map(SchemaVersion::as_str).collect::<Vec<_>>(),
            "Tested file header against candidate versions"
        );

        remaining.retain(|v| compatible.contains(v));
        per_file.push((file.clone(), compatible));

        if remaining.is_empty() {
            let tried = candidates
                .iter()
                .map(SchemaVersion::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(TributaryError::SchemaVersion(format!(
                "No candidate version is compatible with {} ({}) and the files before it; tried {tried}",
                file.path.display(),
                file.type_tag
            )));
        }
    }

    let version = remaining[0].clone();
    tracing::info!(
        version = %version,
        files = files.len(),
        "Determined batch schema version"
    );

    Ok(VersionDetermination {
        version,
        remaining,
        per_file,
    })
}

/// Resolves the batch version from a selection
///
/// A declared version is checked to exist for every delivered format; discovery
/// with an empty candidate list tests every version the registry knows, newest
/// first.
pub fn resolve_version(
    dispatcher: &FormatDispatcher,
    files: &[ExchangeFile],
    selection: &VersionSelection,
) -> Result<SchemaVersion> {
    match selection {
        VersionSelection::Declared(version) => {
            for file in files {
                dispatcher.spec_for(file)?;
                dispatcher.registry().descriptor(&file.type_tag, version)?;
            }
            Ok(version.clone())
        }
        VersionSelection::Discover(candidates) => {
            let candidates = if candidates.is_empty() {
                dispatcher.registry().known_versions()
            } else {
                candidates.clone()
            };
            Ok(determine_version(dispatcher, files, &candidates)?.version)
        }
    }
}
