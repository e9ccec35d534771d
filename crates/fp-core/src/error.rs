//! Unified error types for the floorplanning engine.
//!
//! This module provides a common error type [`FpError`] spanning the error
//! classes of the engine: configuration problems, parse failures, and
//! solver-level invariant violations. Expected/recoverable conditions (a
//! failing alignment request, an infeasible operator application) are
//! value-encoded elsewhere and never raised as errors; only conditions that
//! should abort the run reach this type.
//!
//! # Example
//!
//! ```ignore
//! use fp_core::{FpError, FpResult};
//!
//! fn load_die_outline(path: &str) -> FpResult<()> {
//!     let _outline = read_outline(path)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all floorplanner operations.
#[derive(Error, Debug)]
pub enum FpError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors (unknown block type, malformed tuple, ...)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors (negative alignment range, version mismatch, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Packing/layout-generation invariant violations surfaced outside `DBG_LAYOUT` mode
    #[error("Layout error: {0}")]
    Layout(String),

    /// Configuration errors (missing file, malformed technology description, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using FpError.
pub type FpResult<T> = Result<T, FpError>;

impl From<anyhow::Error> for FpError {
    fn from(err: anyhow::Error) -> Self {
        FpError::Other(err.to_string())
    }
}

impl From<String> for FpError {
    fn from(s: String) -> Self {
        FpError::Other(s)
    }
}

impl From<&str> for FpError {
    fn from(s: &str) -> Self {
        FpError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for FpError {
    fn from(err: serde_json::Error) -> Self {
        FpError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FpError::Layout("overlapping blocks".into());
        assert!(err.to_string().contains("Layout error"));
        assert!(err.to_string().contains("overlapping blocks"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let fp_err: FpError = io_err.into();
        assert!(matches!(fp_err, FpError::Io(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn example_fn() -> FpResult<i32> {
            Ok(42)
        }
        assert_eq!(example_fn().unwrap(), 42);
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> FpResult<()> {
            Err(FpError::Validation("test".into()))
        }

        fn outer() -> FpResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
