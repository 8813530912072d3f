//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found in S3.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied.
    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Network or service error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Operation cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation exceeded its wall-clock bound.
    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Object is too large to copy with the configured part size.
    #[error("Object of {size} bytes needs {parts} parts, more than the maximum of {max_parts}")]
    TooLarge {
        size: u64,
        parts: usize,
        max_parts: usize,
    },

    /// A multipart session could not be created or completed.
    #[error("Multipart copy to s3://{bucket}/{key} failed: {message}")]
    MultipartFailed {
        bucket: String,
        key: String,
        message: String,
    },

    /// Per-file copy failure, wrapping the underlying error with the file name.
    #[error("Failed to copy {name}: {source}")]
    CopyFailed {
        name: String,
        #[source]
        source: Box<StorageError>,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A prefix that is empty or lacks a trailing `/`.
    #[error("Invalid prefix '{prefix}': must be non-empty and end with '/'")]
    InvalidPrefix { prefix: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::Timeout { .. } => true,
            StorageError::CopyFailed { source, .. } => source.is_retryable(),
            StorageError::NotFound { .. }
            | StorageError::AccessDenied { .. }
            | StorageError::Cancelled
            | StorageError::TooLarge { .. }
            | StorageError::MultipartFailed { .. }
            | StorageError::InvalidConfig { .. }
            | StorageError::InvalidPrefix { .. }
            | StorageError::Other { .. } => false,
        }
    }

    /// Wrap an error with the name of the file being copied.
    ///
    /// # Arguments
    /// * `name` - File name for diagnostics
    /// * `source` - Underlying error
    pub fn copy_failed(name: impl Into<String>, source: StorageError) -> Self {
        StorageError::CopyFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error, or the error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            StorageError::Cancelled => true,
            StorageError::CopyFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Per-object failure reported in-band by a batched delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    /// The key that could not be deleted.
    pub key: String,
    /// Service error code (e.g., "AccessDenied").
    pub code: String,
    /// Service error message.
    pub message: String,
}

impl DeleteError {
    /// Create a new delete error.
    pub fn new(key: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_failed_names_file() {
        let err: StorageError = StorageError::copy_failed(
            "17.dat",
            StorageError::NetworkError {
                message: "connection reset".to_string(),
                retryable: true,
            },
        );
        assert_eq!(
            err.to_string(),
            "Failed to copy 17.dat: Network error: connection reset"
        );
        assert!(err.is_retryable());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_through_wrapper() {
        let err: StorageError = StorageError::copy_failed("a.dat", StorageError::Cancelled);
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
    }
}
