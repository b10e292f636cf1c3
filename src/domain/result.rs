//! Result type alias for Tributary
//!
//! This module provides a convenient Result type alias that uses TributaryError
//! as the error type.

use super::errors::TributaryError;

/// Result type alias for Tributary operations
///
/// # Examples
///
/// ```
/// use tributary::domain::result::Result;
/// use tributary::domain::errors::TributaryError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(TributaryError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, TributaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Err(TributaryError::SchemaVersion("none".to_string()))
        }

        let err = inner().unwrap_err();
        assert!(matches!(err, TributaryError::SchemaVersion(_)));
        Ok(())
    }
}
