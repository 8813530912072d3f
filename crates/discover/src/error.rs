//! Discover client error types.

use thiserror::Error;

/// Errors that can occur while calling the discover service.
#[derive(Debug, Error, Clone)]
pub enum DiscoverError {
    /// The service answered with a non-2xx status.
    #[error("Discover request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Transport failure or timeout.
    #[error("Discover request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The response body did not match the expected shape.
    #[error("Could not decode discover response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A returned object URI could not be interpreted.
    #[error("Invalid object URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    /// The client could not be constructed.
    #[error("Invalid discover configuration: {message}")]
    InvalidConfig { message: String },
}

impl DiscoverError {
    /// Create an invalid URI error.
    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        DiscoverError::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DiscoverError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
