//! # Error Types
//!
//! Validation errors raised by the pure types of this crate.
//!
//! ## Error Flow
//! ```text
//! ValidationError (core) ──► EndpointError::Validation (endpoint) ──► caller
//! ```

use thiserror::Error;

/// Input validation errors.
///
/// These errors occur when a config or a path does not meet requirements.
/// They are raised before any backend is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// A path escapes its namespace or is otherwise unusable.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A field holds a value outside its accepted domain.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ValidationError {
    /// Creates a `Required` error for the given field.
    pub fn required(field: &'static str) -> Self {
        ValidationError::Required { field }
    }

    /// Creates an `InvalidPath` error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidValue` error.
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
