//! Logging
//!
//! Structured logging through `tracing`, with an optional rotating JSON log
//! file. The macros below keep the field names of recurring batch events
//! consistent across the crate.
//!
//! # Example
//!
//! ```no_run
//! use tributary::logging::init_logging;
//! use tributary::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a batch
///
/// # Example
///
/// ```no_run
/// use tributary::log_batch_start;
///
/// log_batch_start!("b1f0c6d2", 5);
/// ```
#[macro_export]
macro_rules! log_batch_start {
    ($batch_id:expr, $files:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            files = $files,
            "Starting batch"
        );
    };
}

/// Log the completion of a batch
///
/// # Example
///
/// ```no_run
/// use tributary::log_batch_complete;
/// use std::time::Duration;
///
/// log_batch_complete!("b1f0c6d2", 1200, 3, Duration::from_secs(4));
/// ```
#[macro_export]
macro_rules! log_batch_complete {
    ($batch_id:expr, $saved:expr, $deleted:expr, $duration:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            saved = $saved,
            deleted = $deleted,
            duration_ms = $duration.as_millis() as u64,
            "Batch completed"
        );
    };
}

/// Log the start of a transformer pass over one file
#[macro_export]
macro_rules! log_pass_start {
    ($file_type:expr, $file:expr) => {
        tracing::info!(
            file_type = %$file_type,
            file = %$file,
            "Starting transform pass"
        );
    };
}

/// Log one record error with its provenance
///
/// # Example
///
/// ```no_run
/// use tributary::log_record_error;
/// use tributary::domain::{RecordError, RecordProvenance};
///
/// let err = RecordError::new(
///     RecordProvenance::new("Admin_Patient.csv", "Admin_Patient", 7),
///     "DateOfBirth: expected date",
/// );
/// log_record_error!(err);
/// ```
#[macro_export]
macro_rules! log_record_error {
    ($error:expr) => {
        tracing::error!(
            file = %$error.provenance.file,
            file_type = %$error.provenance.file_type,
            row = $error.provenance.row,
            column = $error.column.as_deref().unwrap_or(""),
            error = %$error.message,
            "Record failed to transform"
        );
    };
}

/// Log the end of a transformer pass
#[macro_export]
macro_rules! log_pass_complete {
    ($file_type:expr, $records:expr, $saved:expr, $deleted:expr, $errors:expr) => {
        tracing::info!(
            file_type = %$file_type,
            records = $records,
            saved = $saved,
            deleted = $deleted,
            errors = $errors,
            "Transform pass completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use tributary::log_error_with_context;
/// use tributary::domain::TributaryError;
///
/// let error = TributaryError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::domain::{RecordError, RecordProvenance, TributaryError};
    use std::time::Duration;

    #[test]
    fn test_macros_expand_without_subscriber() {
        let err = RecordError::new(
            RecordProvenance::new("Admin_Patient.csv", "Admin_Patient", 3),
            "bad date",
        )
        .with_column("DateOfBirth");

        crate::log_batch_start!("batch-1", 2usize);
        crate::log_pass_start!("Admin_Patient", "Admin_Patient.csv");
        crate::log_record_error!(err);
        crate::log_pass_complete!("Admin_Patient", 1usize, 0usize, 0usize, 1usize);
        crate::log_batch_complete!("batch-1", 0usize, 0usize, Duration::from_millis(5));
        crate::log_error_with_context!(
            TributaryError::Configuration("x".to_string()),
            "loading"
        );
    }
}
