//! Shared error types used across rehydration crates.

use thiserror::Error;

/// Request validation errors.
///
/// Raised before any state is touched; never retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent or empty.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the field as it appears on the wire.
        field: &'static str,
    },

    /// A field is present but not acceptable.
    #[error("Invalid value for {field}: {message}")]
    InvalidField {
        /// Name of the field as it appears on the wire.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl ValidationError {
    /// Create a missing-field error.
    ///
    /// # Arguments
    /// * `field` - Wire name of the missing field
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create an invalid-field error.
    ///
    /// # Arguments
    /// * `field` - Wire name of the field
    /// * `message` - Reason for rejection
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Errors parsing a rehydration location URI.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// The URI has no `scheme://` separator.
    #[error("Location has no scheme: {uri}")]
    MissingScheme { uri: String },

    /// The URI has no bucket component.
    #[error("Location has no bucket: {uri}")]
    MissingBucket { uri: String },

    /// The prefix is empty or does not end in `/`.
    #[error("Location prefix must be non-empty and end with '/': {uri}")]
    InvalidPrefix { uri: String },
}
