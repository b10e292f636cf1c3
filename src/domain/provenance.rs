//! Source provenance for records and cells
//!
//! Every value read from a vendor file can be traced back to the file, physical
//! row and column it came from. These types are attached to cell values and to
//! every record-level error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of one source record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordProvenance {
    /// Path of the file the record was read from
    pub file: String,

    /// Declared type tag of the file (e.g. `Admin_Patient`)
    pub file_type: String,

    /// Physical row number, 1-based, counting the header row if there is one
    pub row: u64,
}

impl RecordProvenance {
    /// Creates a new record provenance
    pub fn new(file: impl Into<String>, file_type: impl Into<String>, row: u64) -> Self {
        Self {
            file: file.into(),
            file_type: file_type.into(),
            row,
        }
    }
}

impl fmt::Display for RecordProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) row {}", self.file, self.file_type, self.row)
    }
}

/// Location of one cell within a source record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellProvenance {
    /// The record the cell belongs to
    pub record: RecordProvenance,

    /// Column name as declared by the resolved schema
    pub column: String,

    /// Zero-based column index within the resolved schema
    pub column_index: usize,
}

impl CellProvenance {
    /// Creates a new cell provenance
    pub fn new(record: RecordProvenance, column: impl Into<String>, column_index: usize) -> Self {
        Self {
            record,
            column: column.into(),
            column_index,
        }
    }
}

impl fmt::Display for CellProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} column {} [{}]",
            self.record, self.column, self.column_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_provenance_display() {
        let p = RecordProvenance::new("/data/Admin_Patient.csv", "Admin_Patient", 7);
        assert_eq!(p.to_string(), "/data/Admin_Patient.csv (Admin_Patient) row 7");
    }

    #[test]
    fn test_cell_provenance_display() {
        let p = RecordProvenance::new("a.csv", "Admin_Patient", 2);
        let cell = CellProvenance::new(p, "DateOfBirth", 4);
        assert_eq!(cell.to_string(), "a.csv (Admin_Patient) row 2 column DateOfBirth [4]");
    }
}
