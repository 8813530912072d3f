//! Server error types with HTTP status code mapping

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rehydration_discover::DiscoverError;
use rehydration_service::{AdmissionError, LaunchError, SweepError};
use serde::Serialize;
use thiserror::Error;

/// Error returned by a request handler
#[derive(Error, Debug)]
pub enum ServerError {
    /// Admission refused or failed
    #[error("{0}")]
    Admission(#[from] AdmissionError),

    /// The sweep could not run
    #[error("{0}")]
    Sweep(#[from] SweepError),

    /// The sweep ran but could not clean up every due record
    #[error("Expiration sweep left {failed} records uncleaned")]
    SweepIncomplete { failed: usize },

    /// Request body is not valid JSON
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Admission(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Sweep(_) | ServerError::SweepIncomplete { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable error code for the response body
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Admission(e) => e.error_code(),
            ServerError::BadRequest(_) => "ValidationError",
            ServerError::Sweep(_) => "StoreError",
            ServerError::SweepIncomplete { .. } => "SweepIncomplete",
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, error_type = self.error_type(), "request failed");
        } else {
            tracing::debug!(error = %self, error_type = self.error_type(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.error_type().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Failure to build the process's clients or configuration
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Launch(#[from] LaunchError),

    #[error("{0}")]
    Discover(#[from] DiscoverError),
}

impl StartupError {
    pub fn config(message: impl Into<String>) -> Self {
        StartupError::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_status_mapping() {
        let err: ServerError = AdmissionError::InProgress {
            id: "1/2/".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_type(), "InProgress");

        let err: ServerError = AdmissionError::InconsistentState {
            id: "1/2/".to_string(),
            attempts: 3,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_incomplete_sweep_is_server_error() {
        let err = ServerError::SweepIncomplete { failed: 2 };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Expiration sweep left 2 records uncleaned");
    }
}
