//! Domain error types
//!
//! This module defines the error hierarchy for Tributary. Batch-level failures
//! carry file and record provenance strings so they can be traced back to the
//! source extract from operational logs.

use super::provenance::{CellProvenance, RecordProvenance};
use thiserror::Error;

/// Main Tributary error type
///
/// This is the primary error type used throughout the application.
/// Variants are grouped by how a batch reacts to them:
///
/// - [`TributaryError::SchemaVersion`], [`TributaryError::UnknownFileType`] and
///   [`TributaryError::Exchange`] abort the batch before any row is read
/// - [`TributaryError::Record`] is a single-record failure, collected or fatal
///   depending on the transformer's failure policy
/// - [`TributaryError::RecordErrors`] is the end-of-file escalation of collected
///   record failures
/// - store, transport and terminology errors propagate and abort the batch
#[derive(Debug, Error)]
pub enum TributaryError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No schema version could be confirmed for the batch
    #[error("Schema version error: {0}")]
    SchemaVersion(String),

    /// A delivered file carried a type tag with no registered format
    #[error("Unknown file type '{type_tag}' for {path}")]
    UnknownFileType { type_tag: String, path: String },

    /// The delivered payload does not form one consistent extract
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// A single record could not be transformed
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// One or more records of a file failed and the pass tolerated them until end-of-file
    #[error("{count} record error(s) while transforming {file_type}; first: {first}")]
    RecordErrors {
        file_type: String,
        count: usize,
        first: Box<RecordError>,
    },

    /// Resource filing errors
    #[error("Filer error: {0}")]
    Filer(String),

    /// Database-related errors (generic)
    #[error("Database error: {0}")]
    Database(String),

    /// Terminology service errors
    #[error("Terminology error: {0}")]
    Terminology(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Delimited text parsing errors
    #[error("CSV error: {0}")]
    Csv(String),

    /// XML parsing errors
    #[error("XML error: {0}")]
    Xml(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl TributaryError {
    /// Returns true if the error must abort the whole batch regardless of policy
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TributaryError::Record(_))
    }
}

/// Error raised by a typed cell accessor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CellError {
    /// The column is not part of the resolved schema for this file
    #[error("column '{column}' is not part of the {file_type} schema (file {file})")]
    UnknownColumn {
        file: String,
        file_type: String,
        column: String,
    },

    /// The cell is non-empty but does not parse as the requested type
    #[error("{provenance}: cannot parse '{value}' as {expected}")]
    Parse {
        provenance: CellProvenance,
        expected: &'static str,
        value: String,
    },
}

/// A record-level failure with full row provenance
///
/// # Examples
///
/// ```
/// use tributary::domain::{RecordError, RecordProvenance};
///
/// let provenance = RecordProvenance::new("/data/Admin_Patient.csv", "Admin_Patient", 12);
/// let err = RecordError::new(provenance, "missing PatientGuid");
/// assert_eq!(err.provenance.row, 12);
/// assert!(err.to_string().contains("row 12"));
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{provenance}: {message}")]
pub struct RecordError {
    /// Where the failing record came from
    pub provenance: RecordProvenance,

    /// Column involved, if the failure is tied to one cell
    pub column: Option<String>,

    /// Error message
    pub message: String,
}

impl RecordError {
    /// Creates a new record error
    pub fn new(provenance: RecordProvenance, message: impl Into<String>) -> Self {
        Self {
            provenance,
            column: None,
            message: message.into(),
        }
    }

    /// Sets the column involved
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl From<CellError> for RecordError {
    fn from(err: CellError) -> Self {
        match err {
            CellError::Parse { ref provenance, .. } => {
                let record = provenance.record.clone();
                let column = provenance.column.clone();
                RecordError::new(record, err.to_string()).with_column(column)
            }
            CellError::UnknownColumn {
                ref file,
                ref file_type,
                ref column,
            } => {
                let record = RecordProvenance::new(file.clone(), file_type.clone(), 0);
                let column = column.clone();
                RecordError::new(record, err.to_string()).with_column(column)
            }
        }
    }
}

impl From<CellError> for TributaryError {
    fn from(err: CellError) -> Self {
        TributaryError::Record(err.into())
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for TributaryError {
    fn from(err: std::io::Error) -> Self {
        TributaryError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for TributaryError {
    fn from(err: serde_json::Error) -> Self {
        TributaryError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for TributaryError {
    fn from(err: toml::de::Error) -> Self {
        TributaryError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<csv::Error> for TributaryError {
    fn from(err: csv::Error) -> Self {
        TributaryError::Csv(err.to_string())
    }
}

impl From<quick_xml::Error> for TributaryError {
    fn from(err: quick_xml::Error) -> Self {
        TributaryError::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(row: u64) -> RecordProvenance {
        RecordProvenance::new("/extract/CareRecord_Problem.csv", "CareRecord_Problem", row)
    }

    #[test]
    fn test_tributary_error_display() {
        let err = TributaryError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_record_error_conversion() {
        let record_err = RecordError::new(provenance(4), "bad value");
        let err: TributaryError = record_err.into();
        assert!(matches!(err, TributaryError::Record(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_schema_version_is_fatal() {
        let err = TributaryError::SchemaVersion("no candidates left".to_string());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_record_errors_display_carries_provenance() {
        let err = TributaryError::RecordErrors {
            file_type: "CareRecord_Problem".to_string(),
            count: 3,
            first: Box::new(RecordError::new(provenance(17), "bad date")),
        };
        let text = err.to_string();
        assert!(text.contains("3 record error(s)"));
        assert!(text.contains("row 17"));
        assert!(text.contains("CareRecord_Problem.csv"));
    }

    #[test]
    fn test_cell_parse_error_into_record_error() {
        let cell = CellProvenance::new(provenance(9), "EffectiveDate", 3);
        let err = CellError::Parse {
            provenance: cell,
            expected: "date",
            value: "31/31/2020".to_string(),
        };
        let record: RecordError = err.into();
        assert_eq!(record.provenance.row, 9);
        assert_eq!(record.column.as_deref(), Some("EffectiveDate"));
        assert!(record.message.contains("31/31/2020"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TributaryError = io_err.into();
        assert!(matches!(err, TributaryError::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TributaryError = toml_err.into();
        assert!(matches!(err, TributaryError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_tributary_error_implements_std_error() {
        let err = TributaryError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
