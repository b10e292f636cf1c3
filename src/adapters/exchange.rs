//! File exchange payloads
//!
//! A payload is the ordered list of vendor files delivered together as one
//! extract. It is built either from a JSON manifest or by scanning a directory,
//! and must be validated before any file is read.

use crate::domain::{Result, TributaryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DATA_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "xml"];

/// One delivered file with its declared type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeFile {
    /// Declared vendor file type (e.g. `Admin_Patient`)
    #[serde(rename = "type")]
    pub type_tag: String,

    pub path: PathBuf,
}

impl ExchangeFile {
    pub fn new(type_tag: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            type_tag: type_tag.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    files: Vec<ExchangeFile>,
}

/// Ordered set of files delivered as one extract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    files: Vec<ExchangeFile>,
}

impl Payload {
    pub fn new(files: Vec<ExchangeFile>) -> Self {
        Self { files }
    }

    /// Loads a payload from a JSON manifest
    ///
    /// Relative paths are resolved against the manifest's directory.
    ///
    /// ```json
    /// { "files": [ { "type": "Admin_Patient", "path": "Admin_Patient_001.csv" } ] }
    /// ```
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TributaryError::Exchange(format!("Failed to read manifest {}: {e}", path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&contents).map_err(|e| {
            TributaryError::Exchange(format!("Invalid manifest {}: {e}", path.display()))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let files = manifest
            .files
            .into_iter()
            .map(|f| {
                let path = if f.path.is_relative() {
                    base.join(&f.path)
                } else {
                    f.path
                };
                ExchangeFile::new(f.type_tag, path)
            })
            .collect();

        Ok(Self { files })
    }

    /// Builds a payload from every data file in a directory, sorted by name
    ///
    /// The type tag is the file stem, minus a trailing `_<digits>` date or
    /// sequence segment.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            TributaryError::Exchange(format!("Failed to read directory {}: {e}", dir.display()))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_data = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| DATA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !is_data {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            files.push(ExchangeFile::new(type_tag_from_stem(stem), path.clone()));
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            directory = %dir.display(),
            files = files.len(),
            "Scanned payload directory"
        );

        Ok(Self { files })
    }

    /// Loads a payload from a manifest file or a directory
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_directory(path)
        } else {
            Self::from_manifest(path)
        }
    }

    pub fn files(&self) -> &[ExchangeFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Checks that the payload forms one consistent extract
    ///
    /// Returns the shared parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`TributaryError::Exchange`] if the payload is empty, a file is
    /// missing, or the files do not share one directory.
    pub fn validate(&self) -> Result<PathBuf> {
        let first = self
            .files
            .first()
            .ok_or_else(|| TributaryError::Exchange("Payload contains no files".to_string()))?;

        let common = parent_dir(&first.path);
        for file in &self.files {
            if !file.path.is_file() {
                return Err(TributaryError::Exchange(format!(
                    "Payload file does not exist: {}",
                    file.path.display()
                )));
            }
            if parent_dir(&file.path) != common {
                return Err(TributaryError::Exchange(format!(
                    "Payload files are not in one directory: {} is outside {}",
                    file.path.display(),
                    common.display()
                )));
            }
        }
        Ok(common)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn type_tag_from_stem(stem: &str) -> String {
    match stem.rsplit_once('_') {
        Some((head, tail))
            if !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) =>
        {
            head.to_string()
        }
        _ => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("Admin_Patient", "Admin_Patient")]
    #[test_case("Admin_Patient_20240131", "Admin_Patient")]
    #[test_case("CareRecord_Problem_001", "CareRecord_Problem")]
    #[test_case("Prescribing_Medication_v2", "Prescribing_Medication_v2")]
    fn test_type_tag_from_stem(stem: &str, expected: &str) {
        assert_eq!(type_tag_from_stem(stem), expected);
    }

    #[test]
    fn test_from_directory_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CareRecord_Problem_1.csv"), "").unwrap();
        std::fs::write(dir.path().join("Admin_Patient_1.csv"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();

        let payload = Payload::from_directory(dir.path()).unwrap();
        let tags: Vec<&str> = payload.files().iter().map(|f| f.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["Admin_Patient", "CareRecord_Problem"]);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_from_manifest_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p.csv"), "").unwrap();
        let manifest = dir.path().join("manifest.json");
        std::fs::write(
            &manifest,
            r#"{"files":[{"type":"Admin_Patient","path":"p.csv"}]}"#,
        )
        .unwrap();

        let payload = Payload::load(&manifest).unwrap();
        assert_eq!(payload.files()[0].path, dir.path().join("p.csv"));
        assert_eq!(payload.validate().unwrap(), dir.path());
    }

    #[test]
    fn test_validate_rejects_empty_payload() {
        assert!(matches!(
            Payload::default().validate(),
            Err(TributaryError::Exchange(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let payload = Payload::new(vec![ExchangeFile::new("Admin_Patient", dir.path().join("gone.csv"))]);
        assert!(payload.validate().unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_rejects_split_directories() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::write(a.path().join("x.csv"), "").unwrap();
        std::fs::write(b.path().join("y.csv"), "").unwrap();
        let payload = Payload::new(vec![
            ExchangeFile::new("Admin_Patient", a.path().join("x.csv")),
            ExchangeFile::new("CareRecord_Problem", b.path().join("y.csv")),
        ]);
        assert!(payload.validate().unwrap_err().to_string().contains("one directory"));
    }
}
