//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers that flow through a
//! transform batch. Vendor-local record ids are only unique inside their parent
//! scope (usually a patient), so every entity is addressed by a [`CompositeKey`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between scope and local id in the rendered key
pub const KEY_SEPARATOR: char = ':';

/// Synthetic identifier combining a parent scope id and a vendor-local record id
///
/// Two records with the same local id but a different scope never collide.
///
/// # Examples
///
/// ```
/// use tributary::domain::ids::CompositeKey;
///
/// let a = CompositeKey::new("patient-1", "obs-9").unwrap();
/// let b = CompositeKey::new("patient-2", "obs-9").unwrap();
/// assert_ne!(a, b);
/// assert_eq!(a.to_string(), "patient-1:obs-9");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    scope: String,
    local_id: String,
}

impl CompositeKey {
    /// Creates a new CompositeKey
    ///
    /// # Arguments
    ///
    /// * `scope` - The parent scope id (patient id, organisation id, ...)
    /// * `local_id` - The vendor-local record id
    ///
    /// # Returns
    ///
    /// Returns `Ok(CompositeKey)` if both parts are non-empty and the scope does
    /// not contain the separator, `Err` otherwise
    pub fn new(scope: impl Into<String>, local_id: impl Into<String>) -> Result<Self, String> {
        let scope = scope.into().trim().to_string();
        let local_id = local_id.into().trim().to_string();
        if scope.is_empty() {
            return Err("Composite key scope cannot be empty".to_string());
        }
        if local_id.is_empty() {
            return Err("Composite key local id cannot be empty".to_string());
        }
        if scope.contains(KEY_SEPARATOR) {
            return Err(format!(
                "Composite key scope cannot contain '{KEY_SEPARATOR}': {scope}"
            ));
        }
        Ok(Self { scope, local_id })
    }

    /// Returns the parent scope id
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the vendor-local record id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scope, KEY_SEPARATOR, self.local_id)
    }
}

impl FromStr for CompositeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, local_id) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| format!("Invalid composite key '{s}'. Expected {{scope}}:{{local_id}}"))?;
        Self::new(scope, local_id)
    }
}

/// Target resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// Organisation (administrative)
    Organization,
    /// Patient demographics
    Patient,
    /// Problem / diagnosis
    Condition,
    /// Clinical observation
    Observation,
    /// Medication issue or statement
    MedicationStatement,
}

impl ResourceType {
    /// Returns the canonical resource type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Organization => "Organization",
            ResourceType::Patient => "Patient",
            ResourceType::Condition => "Condition",
            ResourceType::Observation => "Observation",
            ResourceType::MedicationStatement => "MedicationStatement",
        }
    }

    /// Returns true for resources that are not scoped to a patient
    pub fn is_admin(&self) -> bool {
        matches!(self, ResourceType::Organization)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Organization" => Ok(ResourceType::Organization),
            "Patient" => Ok(ResourceType::Patient),
            "Condition" => Ok(ResourceType::Condition),
            "Observation" => Ok(ResourceType::Observation),
            "MedicationStatement" => Ok(ResourceType::MedicationStatement),
            other => Err(format!("Unknown resource type: {other}")),
        }
    }
}

/// Declared vendor format version (e.g. `5.3`)
///
/// # Examples
///
/// ```
/// use tributary::domain::ids::SchemaVersion;
/// use std::str::FromStr;
///
/// let version = SchemaVersion::from_str("5.3").unwrap();
/// assert_eq!(version.as_str(), "5.3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion(pub(crate) String);

impl SchemaVersion {
    /// Creates a new SchemaVersion from a string
    pub fn new(version: impl Into<String>) -> Result<Self, String> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err("Schema version cannot be empty".to_string());
        }
        Ok(Self(version.trim().to_string()))
    }

    /// Returns the version as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SchemaVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_composite_key_creation() {
        let key = CompositeKey::new("P1", "R1").unwrap();
        assert_eq!(key.scope(), "P1");
        assert_eq!(key.local_id(), "R1");
        assert_eq!(key.to_string(), "P1:R1");
    }

    #[test]
    fn test_composite_key_empty_fails() {
        assert!(CompositeKey::new("", "R1").is_err());
        assert!(CompositeKey::new("P1", "   ").is_err());
    }

    #[test]
    fn test_composite_key_scope_cannot_contain_separator() {
        assert!(CompositeKey::new("P:1", "R1").is_err());
    }

    #[test]
    fn test_same_local_id_different_scope_never_collide() {
        let mut keys = HashSet::new();
        keys.insert(CompositeKey::new("P1", "R1").unwrap());
        keys.insert(CompositeKey::new("P2", "R1").unwrap());
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_composite_key_from_str() {
        let key: CompositeKey = "P1:R:1".parse().unwrap();
        assert_eq!(key.scope(), "P1");
        assert_eq!(key.local_id(), "R:1");
        assert!("no-separator".parse::<CompositeKey>().is_err());
    }

    #[test]
    fn test_composite_key_serialization() {
        let key = CompositeKey::new("P1", "R1").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        let back: CompositeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn test_resource_type_round_trip() {
        for rt in [
            ResourceType::Organization,
            ResourceType::Patient,
            ResourceType::Condition,
            ResourceType::Observation,
            ResourceType::MedicationStatement,
        ] {
            assert_eq!(rt.as_str().parse::<ResourceType>().unwrap(), rt);
        }
        assert!("Encounter".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_schema_version_empty_fails() {
        assert!(SchemaVersion::new("").is_err());
        assert_eq!(SchemaVersion::new(" 5.1 ").unwrap().as_str(), "5.1");
    }
}
