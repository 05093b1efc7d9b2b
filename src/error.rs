//! Error types for the tracexpect crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TracexpectError>;

/// Errors surfaced while building patterns or registering them with a
/// validator.
///
/// Pattern construction problems are reported eagerly, when the pattern is
/// registered, rather than lazily during event dispatch. A malformed pattern
/// therefore never reaches the evaluation loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TracexpectError {
    /// The pattern tree is structurally invalid (for example a data node
    /// with children, or a grouping node with more than one inner
    /// expression).
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A regex-based condition was built from an unparsable pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// A record template could not be built from the provided JSON value.
    #[error("Invalid record template: {0}")]
    InvalidTemplate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_invalid_pattern_display() {
        let error = TracexpectError::InvalidPattern("data node cannot have children".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid pattern: data node cannot have children"
        );
        assert!(error.source().is_none());
    }

    #[test]
    fn test_invalid_regex_display() {
        let error = TracexpectError::InvalidRegex("unclosed group: (abc".to_string());
        assert_eq!(error.to_string(), "Invalid regex pattern: unclosed group: (abc");
    }

    #[test]
    fn test_invalid_template_display() {
        let error = TracexpectError::InvalidTemplate("expected a JSON object".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid record template: expected a JSON object"
        );
    }

    #[test]
    fn test_error_equality() {
        let error1 = TracexpectError::InvalidPattern("test".to_string());
        let error2 = TracexpectError::InvalidPattern("test".to_string());
        let error3 = TracexpectError::InvalidPattern("different".to_string());

        assert_eq!(error1, error2);
        assert_ne!(error1, error3);
        assert_ne!(
            TracexpectError::InvalidRegex("x".to_string()),
            TracexpectError::InvalidTemplate("x".to_string())
        );
    }

    #[test]
    fn test_error_clone() {
        let error = TracexpectError::InvalidRegex("(a".to_string());
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }

    #[test]
    fn test_error_debug() {
        let error = TracexpectError::InvalidPattern("x".to_string());
        let debug_str = format!("{error:?}");
        assert!(debug_str.contains("InvalidPattern"));
    }

    #[test]
    fn test_result_type_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        fn err_fn() -> Result<i32> {
            Err(TracexpectError::InvalidPattern("bad".to_string()))
        }

        assert_eq!(ok_fn().unwrap(), 42);
        match err_fn().unwrap_err() {
            TracexpectError::InvalidPattern(msg) => assert_eq!(msg, "bad"),
            other => panic!("Expected InvalidPattern, got {other:?}"),
        }
    }
}
