//! Versioned schema resolution
//!
//! Vendors add, rename and remove columns between extract releases without
//! notice. The [`SchemaRegistry`] holds the exact ordered column list for every
//! (format, version) pair it knows about, and can test a file's observed header
//! against a ranked list of candidate versions.
//!
//! Header comparison is exact: same column count, same names, same order. The
//! only tolerance is an enumerated table of known misspellings per format, so a
//! vendor fixture that writes `EffectiveDatePrecison` still matches while any
//! other deviation rejects the version.

use crate::domain::{Result, SchemaVersion, TributaryError};
use std::collections::HashMap;

/// Expected column list for one version of one vendor file format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    /// Format identifier (the file type tag)
    pub format: String,

    /// Version this descriptor applies to
    pub version: SchemaVersion,

    /// Ordered column names
    pub columns: Vec<String>,
}

/// A known vendor misspelling of a column name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownMisspelling {
    /// Column name as declared in the schema
    pub expected: String,

    /// Spelling that is accepted in its place
    pub variant: String,
}

/// Registry of schema descriptors keyed by (format, version)
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    descriptors: HashMap<(String, SchemaVersion), SchemaDescriptor>,
    misspellings: HashMap<String, Vec<KnownMisspelling>>,
    /// Versions in registration order, newest last
    versions: Vec<SchemaVersion>,
}

impl SchemaRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the column list for a (format, version) pair
    ///
    /// Registering the same pair twice replaces the earlier descriptor.
    pub fn register(&mut self, format: &str, version: &str, columns: &[&str]) {
        let version = SchemaVersion(version.to_string());
        if !self.versions.contains(&version) {
            self.versions.push(version.clone());
        }
        self.descriptors.insert(
            (format.to_string(), version.clone()),
            SchemaDescriptor {
                format: format.to_string(),
                version,
                columns: columns.iter().map(|c| c.to_string()).collect(),
            },
        );
    }

    /// Registers a misspelling that is tolerated for one column of one format
    pub fn register_misspelling(&mut self, format: &str, expected: &str, variant: &str) {
        self.misspellings
            .entry(format.to_string())
            .or_default()
            .push(KnownMisspelling {
                expected: expected.to_string(),
                variant: variant.to_string(),
            });
    }

    /// Returns every version known to the registry, newest first
    pub fn known_versions(&self) -> Vec<SchemaVersion> {
        self.versions.iter().rev().cloned().collect()
    }

    /// Returns the versions that declare the given format, newest first
    pub fn versions_for(&self, format: &str) -> Vec<SchemaVersion> {
        self.versions
            .iter()
            .rev()
            .filter(|v| self.descriptors.contains_key(&(format.to_string(), (*v).clone())))
            .cloned()
            .collect()
    }

    /// Returns the descriptor for a (format, version) pair
    ///
    /// # Errors
    ///
    /// Returns a schema version error if the pair is unknown.
    pub fn descriptor(&self, format: &str, version: &SchemaVersion) -> Result<&SchemaDescriptor> {
        self.descriptors
            .get(&(format.to_string(), version.clone()))
            .ok_or_else(|| {
                TributaryError::SchemaVersion(format!(
                    "No schema for format '{format}' at version {version}"
                ))
            })
    }

    /// Returns the exact ordered column list for a (format, version) pair
    pub fn columns(&self, format: &str, version: &SchemaVersion) -> Result<&[String]> {
        Ok(&self.descriptor(format, version)?.columns)
    }

    /// Returns true if an observed header name satisfies an expected column
    fn column_matches(&self, format: &str, expected: &str, observed: &str) -> bool {
        let observed = observed.trim();
        if observed == expected {
            return true;
        }
        self.misspellings
            .get(format)
            .map(|known| {
                known
                    .iter()
                    .any(|m| m.expected == expected && m.variant == observed)
            })
            .unwrap_or(false)
    }

    /// Returns true if an observed header is structurally identical to the expected columns
    pub fn header_matches(&self, format: &str, expected: &[String], observed: &[String]) -> bool {
        expected.len() == observed.len()
            && expected
                .iter()
                .zip(observed)
                .all(|(e, o)| self.column_matches(format, e, o))
    }

    /// Validates an observed header against one declared version
    ///
    /// # Errors
    ///
    /// Returns a schema version error describing the first mismatch.
    pub fn validate_header(
        &self,
        format: &str,
        version: &SchemaVersion,
        observed: &[String],
    ) -> Result<()> {
        let expected = self.columns(format, version)?;
        if self.header_matches(format, expected, observed) {
            return Ok(());
        }

        let detail = if expected.len() != observed.len() {
            format!(
                "expected {} columns, found {}",
                expected.len(),
                observed.len()
            )
        } else {
            expected
                .iter()
                .zip(observed)
                .enumerate()
                .find(|(_, (e, o))| !self.column_matches(format, e, o))
                .map(|(i, (e, o))| format!("column {i} expected '{e}', found '{o}'"))
                .unwrap_or_default()
        };

        Err(TributaryError::SchemaVersion(format!(
            "Header of {format} does not match version {version}: {detail}"
        )))
    }

    /// Filters ranked candidate versions down to those compatible with an observed header
    ///
    /// The relative order of `candidates` is preserved. Versions that do not
    /// declare `format` at all are dropped.
    pub fn compatible_versions(
        &self,
        format: &str,
        candidates: &[SchemaVersion],
        observed: &[String],
    ) -> Vec<SchemaVersion> {
        candidates
            .iter()
            .filter(|v| {
                self.descriptors
                    .get(&(format.to_string(), (*v).clone()))
                    .map(|d| self.header_matches(format, &d.columns, observed))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Filters candidates for a headerless file by its observed column count
    pub fn compatible_versions_by_width(
        &self,
        format: &str,
        candidates: &[SchemaVersion],
        width: usize,
    ) -> Vec<SchemaVersion> {
        candidates
            .iter()
            .filter(|v| {
                self.descriptors
                    .get(&(format.to_string(), (*v).clone()))
                    .map(|d| d.columns.len() == width)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Builds the registry for the bundled vendor extract family
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (format, version, columns) in BUILTIN_SCHEMAS {
            registry.register(format, version, columns);
        }
        for (format, expected, variant) in BUILTIN_MISSPELLINGS {
            registry.register_misspelling(format, expected, variant);
        }
        registry
    }
}

/// Column names shared by the bundled formats
pub mod columns {
    pub const ORGANISATION_GUID: &str = "OrganisationGuid";
    pub const PATIENT_GUID: &str = "PatientGuid";
    pub const PROBLEM_GUID: &str = "ProblemGuid";
    pub const OBSERVATION_GUID: &str = "ObservationGuid";
    pub const MEDICATION_GUID: &str = "MedicationGuid";
    pub const EFFECTIVE_DATE: &str = "EffectiveDate";
    pub const EFFECTIVE_DATE_PRECISION: &str = "EffectiveDatePrecision";
    pub const CODE_ID: &str = "CodeId";
    pub const CODE_SCHEME: &str = "CodeScheme";
    pub const TERM: &str = "Term";
    pub const DELETED: &str = "Deleted";
    pub const PROCESSING_ID: &str = "ProcessingId";
}

// Bundled vendor catalogue, oldest version first.
const BUILTIN_SCHEMAS: &[(&str, &str, &[&str])] = &[
    (
        "Admin_Organisation",
        "5.0",
        &[
            "OrganisationGuid",
            "Name",
            "OdsCode",
            "ParentOrganisationGuid",
            "OpenDate",
            "CloseDate",
            "Deleted",
        ],
    ),
    (
        "Admin_Patient",
        "5.0",
        &[
            "PatientGuid",
            "OrganisationGuid",
            "Title",
            "GivenName",
            "Surname",
            "Sex",
            "DateOfBirth",
            "DateOfDeath",
            "DateOfRegistration",
            "DateOfDeactivation",
            "Deleted",
        ],
    ),
    (
        "CareRecord_Problem",
        "5.0",
        &[
            "ProblemGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Status",
            "Significance",
            "EndDate",
            "Deleted",
        ],
    ),
    (
        "CareRecord_Observation",
        "5.0",
        &[
            "ObservationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Value",
            "Units",
            "ProblemGuid",
            "Deleted",
        ],
    ),
    (
        "Prescribing_Medication",
        "5.0",
        &[
            "MedicationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "DrugCode",
            "DrugScheme",
            "Term",
            "Dosage",
            "Quantity",
            "QuantityUnit",
            "ProblemGuid",
            "IsActive",
            "Deleted",
        ],
    ),
    (
        "Admin_Organisation",
        "5.1",
        &[
            "OrganisationGuid",
            "Name",
            "OdsCode",
            "ParentOrganisationGuid",
            "OpenDate",
            "CloseDate",
            "Deleted",
        ],
    ),
    (
        "Admin_Patient",
        "5.1",
        &[
            "PatientGuid",
            "OrganisationGuid",
            "NhsNumber",
            "Title",
            "GivenName",
            "Surname",
            "Sex",
            "DateOfBirth",
            "DateOfDeath",
            "DateOfRegistration",
            "DateOfDeactivation",
            "Deleted",
        ],
    ),
    (
        "CareRecord_Problem",
        "5.1",
        &[
            "ProblemGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Status",
            "Significance",
            "EndDate",
            "LastReviewDate",
            "Deleted",
        ],
    ),
    (
        "CareRecord_Observation",
        "5.1",
        &[
            "ObservationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Value",
            "Units",
            "NumericRangeLow",
            "NumericRangeHigh",
            "ProblemGuid",
            "Deleted",
        ],
    ),
    (
        "Prescribing_Medication",
        "5.1",
        &[
            "MedicationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "DrugCode",
            "DrugScheme",
            "Term",
            "DosageText",
            "Quantity",
            "QuantityUnit",
            "ProblemGuid",
            "IsActive",
            "Deleted",
        ],
    ),
    (
        "Admin_Organisation",
        "5.3",
        &[
            "OrganisationGuid",
            "Name",
            "OdsCode",
            "OrganisationType",
            "ParentOrganisationGuid",
            "OpenDate",
            "CloseDate",
            "Deleted",
        ],
    ),
    (
        "Admin_Patient",
        "5.3",
        &[
            "PatientGuid",
            "OrganisationGuid",
            "NhsNumber",
            "Title",
            "GivenName",
            "FamilyName",
            "Sex",
            "DateOfBirth",
            "DateOfDeath",
            "DateOfRegistration",
            "DateOfDeactivation",
            "Deleted",
            "ProcessingId",
        ],
    ),
    (
        "CareRecord_Problem",
        "5.3",
        &[
            "ProblemGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Status",
            "EndDate",
            "LastReviewDate",
            "Deleted",
            "ProcessingId",
        ],
    ),
    (
        "CareRecord_Observation",
        "5.3",
        &[
            "ObservationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "CodeId",
            "CodeScheme",
            "Term",
            "Value",
            "Units",
            "NumericRangeLow",
            "NumericRangeHigh",
            "ProblemGuid",
            "Deleted",
            "ProcessingId",
        ],
    ),
    (
        "Prescribing_Medication",
        "5.3",
        &[
            "MedicationGuid",
            "PatientGuid",
            "OrganisationGuid",
            "EffectiveDate",
            "EffectiveDatePrecision",
            "DrugCode",
            "DrugScheme",
            "Term",
            "DosageText",
            "Quantity",
            "QuantityUnit",
            "ProblemGuid",
            "IsActive",
            "Deleted",
            "ProcessingId",
        ],
    ),
];

// Misspellings observed in vendor test packs.
const BUILTIN_MISSPELLINGS: &[(&str, &str, &str)] = &[
    (
        "CareRecord_Observation",
        "EffectiveDatePrecision",
        "EffectiveDatePrecison",
    ),
    ("Admin_Patient", "DateOfDeactivation", "DateOfDeactiviation"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn v(s: &str) -> SchemaVersion {
        SchemaVersion::new(s).unwrap()
    }

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test_case("Admin_Patient", "5.0", 11, "Surname")]
    #[test_case("Admin_Patient", "5.1", 12, "Surname")]
    #[test_case("Admin_Patient", "5.3", 13, "FamilyName")]
    #[test_case("CareRecord_Observation", "5.1", 14, "NumericRangeLow")]
    #[test_case("Prescribing_Medication", "5.0", 14, "Dosage")]
    #[test_case("Prescribing_Medication", "5.3", 15, "DosageText")]
    fn test_builtin_columns(format: &str, version: &str, len: usize, contains: &str) {
        let registry = SchemaRegistry::builtin();
        let columns = registry.columns(format, &v(version)).unwrap();
        assert_eq!(columns.len(), len);
        assert!(columns.iter().any(|c| c == contains));
    }

    #[test]
    fn test_columns_exact_order() {
        let mut registry = SchemaRegistry::new();
        registry.register("F", "1", &["A", "B", "C"]);
        assert_eq!(registry.columns("F", &v("1")).unwrap(), &header(&["A", "B", "C"])[..]);
    }

    #[test]
    fn test_unknown_version_fails() {
        let registry = SchemaRegistry::builtin();
        let err = registry.columns("Admin_Patient", &v("9.9")).unwrap_err();
        assert!(matches!(err, TributaryError::SchemaVersion(_)));
    }

    #[test]
    fn test_compatible_versions_preserves_rank_order() {
        let mut registry = SchemaRegistry::new();
        registry.register("F", "1", &["A", "B"]);
        registry.register("F", "2", &["A", "B"]);
        registry.register("F", "3", &["A", "B", "C"]);

        let candidates = vec![v("3"), v("2"), v("1")];
        let result = registry.compatible_versions("F", &candidates, &header(&["A", "B"]));
        assert_eq!(result, vec![v("2"), v("1")]);
    }

    #[test]
    fn test_compatible_versions_requires_same_order() {
        let mut registry = SchemaRegistry::new();
        registry.register("F", "1", &["A", "B"]);
        let result = registry.compatible_versions("F", &[v("1")], &header(&["B", "A"]));
        assert!(result.is_empty());
    }

    #[test]
    fn test_known_misspelling_tolerated() {
        let registry = SchemaRegistry::builtin();
        let mut observed = registry
            .columns("CareRecord_Observation", &v("5.3"))
            .unwrap()
            .to_vec();
        observed[4] = "EffectiveDatePrecison".to_string();

        assert!(registry
            .validate_header("CareRecord_Observation", &v("5.3"), &observed)
            .is_ok());
    }

    #[test]
    fn test_misspelling_is_scoped_to_its_format() {
        let registry = SchemaRegistry::builtin();
        let mut observed = registry
            .columns("CareRecord_Problem", &v("5.3"))
            .unwrap()
            .to_vec();
        observed[4] = "EffectiveDatePrecison".to_string();

        assert!(registry
            .validate_header("CareRecord_Problem", &v("5.3"), &observed)
            .is_err());
    }

    #[test]
    fn test_unlisted_misspelling_rejected() {
        let registry = SchemaRegistry::builtin();
        let mut observed = registry
            .columns("CareRecord_Observation", &v("5.3"))
            .unwrap()
            .to_vec();
        observed[4] = "EffectiveDatePrecisoin".to_string();

        let err = registry
            .validate_header("CareRecord_Observation", &v("5.3"), &observed)
            .unwrap_err();
        assert!(err.to_string().contains("column 4"));
    }

    #[test]
    fn test_versions_for_newest_first() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(
            registry.versions_for("Admin_Patient"),
            vec![v("5.3"), v("5.1"), v("5.0")]
        );
    }

    #[test]
    fn test_compatible_versions_by_width() {
        let registry = SchemaRegistry::builtin();
        let all = registry.known_versions();
        let result = registry.compatible_versions_by_width("Admin_Patient", &all, 12);
        assert_eq!(result, vec![v("5.1")]);
    }
}
