//! CLI command implementations

pub mod detect_version;
pub mod init;
pub mod transform;
pub mod validate;

use crate::domain::TributaryError;

/// Exit code for a failed batch or command
///
/// 1 for record errors, 2 for configuration, 5 for anything else fatal.
pub fn exit_code_for(error: &TributaryError) -> i32 {
    match error {
        TributaryError::Record(_) | TributaryError::RecordErrors { .. } => 1,
        TributaryError::Configuration(_) => 2,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecordError, RecordProvenance};

    #[test]
    fn test_exit_codes() {
        let record = RecordError::new(RecordProvenance::new("f.csv", "Admin_Patient", 2), "bad");
        assert_eq!(exit_code_for(&TributaryError::Record(record.clone())), 1);
        assert_eq!(
            exit_code_for(&TributaryError::RecordErrors {
                file_type: "Admin_Patient".to_string(),
                count: 3,
                first: Box::new(record),
            }),
            1
        );
        assert_eq!(exit_code_for(&TributaryError::Configuration("x".to_string())), 2);
        assert_eq!(exit_code_for(&TributaryError::SchemaVersion("x".to_string())), 5);
        assert_eq!(exit_code_for(&TributaryError::Filer("x".to_string())), 5);
    }
}
