//! Service error types.

use rehydration_common::ValidationError;
use rehydration_discover::DiscoverError;
use rehydration_idempotency::{IdempotencyError, RecordStatus};
use thiserror::Error;

/// Why an admission request was not started.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The request body is missing a field or carries an invalid one.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Another worker owns this dataset version.
    #[error("Rehydration of {id} is already in progress")]
    InProgress { id: String },

    /// The previous rehydration is being expired.
    #[error("Rehydration of {id} is expiring; retry once expiration completes")]
    Expired { id: String },

    /// The record kept appearing and vanishing across reads.
    #[error("Idempotency record {id} changed concurrently {attempts} times")]
    InconsistentState { id: String, attempts: usize },

    /// Idempotency store failure.
    #[error("{0}")]
    Store(#[from] IdempotencyError),

    /// The worker task could not be started.
    #[error("{0}")]
    Launch(#[from] LaunchError),
}

impl AdmissionError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::Validation(_) => 400,
            AdmissionError::InProgress { .. } | AdmissionError::Expired { .. } => 409,
            AdmissionError::InconsistentState { .. }
            | AdmissionError::Store(_)
            | AdmissionError::Launch(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdmissionError::Validation(_) => "ValidationError",
            AdmissionError::InProgress { .. } => "InProgress",
            AdmissionError::Expired { .. } => "Expired",
            AdmissionError::InconsistentState { .. } => "InconsistentState",
            AdmissionError::Store(_) => "StoreError",
            AdmissionError::Launch(_) => "LaunchError",
        }
    }
}

/// Failure to start a worker task.
#[derive(Debug, Error, Clone)]
pub enum LaunchError {
    /// ECS rejected or failed the RunTask call.
    #[error("ECS RunTask failed: {message}")]
    Ecs { message: String },

    /// RunTask returned without a task.
    #[error("ECS started no task: {reason}")]
    NoTask { reason: String },

    /// The local worker process could not be spawned.
    #[error("Failed to spawn worker process: {message}")]
    Spawn { message: String },

    /// The launcher is misconfigured.
    #[error("Invalid launcher configuration: {message}")]
    InvalidConfig { message: String },
}

fn describe_status(status: &Option<RecordStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no record".to_string(),
    }
}

/// Failure of one rehydration attempt.
#[derive(Debug, Error)]
pub enum RehydrationError {
    /// The worker does not own an IN_PROGRESS record.
    #[error("Idempotency record {id} is not IN_PROGRESS (found {})", describe_status(.status))]
    NotInProgress {
        id: String,
        status: Option<RecordStatus>,
    },

    /// A discover lookup failed.
    #[error("{0}")]
    Discover(#[from] DiscoverError),

    /// One or more files failed to copy.
    #[error("{failed} of {total} files failed to copy; first error: {first_error}")]
    CopyFailed {
        failed: u64,
        total: u64,
        first_error: String,
    },

    /// Idempotency store failure.
    #[error("{0}")]
    Store(#[from] IdempotencyError),

    /// The attempt was cancelled.
    #[error("Rehydration cancelled")]
    Cancelled,
}

impl RehydrationError {
    /// Whether finalize should roll the record back.
    ///
    /// A worker that never owned the record must leave it alone.
    pub fn owns_record(&self) -> bool {
        !matches!(self, RehydrationError::NotInProgress { .. })
    }
}

/// Failure of an expiration sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Idempotency store failure.
    #[error("{0}")]
    Store(#[from] IdempotencyError),
}

/// A worker environment variable is missing or malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskEnvError {
    #[error("Missing environment variable {name}")]
    Missing { name: &'static str },

    #[error("Invalid environment variable {name}='{value}': {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

/// Notification delivery failed.
#[derive(Debug, Error, Clone)]
#[error("Notification failed: {message}")]
pub struct NotifyError {
    pub message: String,
}
