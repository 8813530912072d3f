//! Idempotency store error types.

use std::fmt;

use thiserror::Error;

use crate::record::IdempotencyRecord;

/// One field whose stored value did not match a write precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    /// Stored attribute name (e.g., "status").
    pub field: String,
    /// Value the precondition required.
    pub expected: Option<String>,
    /// Value actually stored; None when the attribute (or record) is absent.
    pub actual: Option<String>,
}

impl FieldMismatch {
    pub fn new(field: impl Into<String>, expected: Option<String>, actual: Option<String>) -> Self {
        Self {
            field: field.into(),
            expected,
            actual,
        }
    }
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expected {} but was {}",
            self.field,
            self.expected.as_deref().unwrap_or("<absent>"),
            self.actual.as_deref().unwrap_or("<absent>")
        )
    }
}

fn describe(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join(", ")
}

/// Errors that can occur during idempotency store operations.
#[derive(Error, Debug, Clone)]
pub enum IdempotencyError {
    /// Conditional insert lost: a record already exists.
    ///
    /// `existing` carries the stored record when the backend returned it.
    #[error("Idempotency record {id} already exists")]
    RecordAlreadyExists {
        id: String,
        existing: Option<Box<IdempotencyRecord>>,
    },

    /// Conditional update on an absent record.
    #[error("Idempotency record {id} does not exist")]
    RecordDoesNotExist { id: String },

    /// Optimistic-concurrency mismatch.
    #[error("Condition failed for idempotency record {id}: {}", describe(.mismatches))]
    ConditionFailed {
        id: String,
        mismatches: Vec<FieldMismatch>,
    },

    /// A stored item could not be decoded, or a record breaks its invariants.
    #[error("Invalid idempotency record {id}: {message}")]
    InvalidRecord { id: String, message: String },

    /// DynamoDB error.
    #[error("DynamoDB error: {message}")]
    DynamoDb { message: String },
}

impl IdempotencyError {
    /// Create a DynamoDB error from any displayable failure.
    pub fn dynamodb(message: impl fmt::Display) -> Self {
        IdempotencyError::DynamoDb {
            message: message.to_string(),
        }
    }

    /// Whether this is an expected concurrency outcome rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IdempotencyError::RecordAlreadyExists { .. } | IdempotencyError::ConditionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_failed_lists_fields() {
        let err = IdempotencyError::ConditionFailed {
            id: "43/1/".to_string(),
            mismatches: vec![
                FieldMismatch::new(
                    "status",
                    Some("COMPLETED".to_string()),
                    Some("EXPIRED".to_string()),
                ),
                FieldMismatch::new("expirationDate", Some("2024-01-01T00:00:00.000000000Z".to_string()), None),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Condition failed for idempotency record 43/1/: status expected COMPLETED but was EXPIRED, \
             expirationDate expected 2024-01-01T00:00:00.000000000Z but was <absent>"
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn test_dynamodb_error_is_not_conflict() {
        let err: IdempotencyError = IdempotencyError::dynamodb("throttled");
        assert_eq!(err.to_string(), "DynamoDB error: throttled");
        assert!(!err.is_conflict());
    }
}
