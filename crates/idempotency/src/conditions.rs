//! Precondition checks shared by the store backends.
//!
//! The in-memory store evaluates these directly; the DynamoDB store lets the
//! service evaluate the equivalent condition expression and uses these only
//! to explain a failure from the returned old item.

use chrono::{DateTime, Utc};

use crate::dynamodb::schema::{ATTR_EXPIRATION_DATE, ATTR_STATUS};
use crate::error::{FieldMismatch, IdempotencyError};
use crate::record::{ExpirationProjection, IdempotencyRecord, RecordStatus};
use crate::timestamp::format_timestamp;

/// Whether `set_expiration_date(date)` may be applied to `stored`.
pub(crate) fn expiration_update_allowed(stored: &IdempotencyRecord, date: &DateTime<Utc>) -> bool {
    stored.status == RecordStatus::Completed
        && stored.expiration_date.map_or(true, |current| current < *date)
}

/// Explain why `set_expiration_date(date)` was rejected.
pub(crate) fn expiration_update_error(
    id: &str,
    stored: Option<&IdempotencyRecord>,
    date: &DateTime<Utc>,
) -> IdempotencyError {
    let Some(stored) = stored else {
        return IdempotencyError::RecordDoesNotExist { id: id.to_string() };
    };

    let mut mismatches: Vec<FieldMismatch> = Vec::new();
    if stored.status != RecordStatus::Completed {
        mismatches.push(FieldMismatch::new(
            ATTR_STATUS,
            Some(RecordStatus::Completed.to_string()),
            Some(stored.status.to_string()),
        ));
    }
    if let Some(current) = stored.expiration_date {
        if current >= *date {
            mismatches.push(FieldMismatch::new(
                ATTR_EXPIRATION_DATE,
                Some(format!("< {}", format_timestamp(date))),
                Some(format_timestamp(&current)),
            ));
        }
    }

    IdempotencyError::ConditionFailed {
        id: id.to_string(),
        mismatches,
    }
}

/// Whether `stored` still matches the projection.
pub(crate) fn projection_matches(
    projection: &ExpirationProjection,
    stored: &IdempotencyRecord,
) -> bool {
    stored.status == projection.status && stored.expiration_date == Some(projection.expiration_date)
}

/// Describe a compare-and-set miss against a projection.
pub(crate) fn projection_error(
    projection: &ExpirationProjection,
    stored: Option<&IdempotencyRecord>,
) -> IdempotencyError {
    let expected_status: String = projection.status.to_string();
    let expected_date: String = format_timestamp(&projection.expiration_date);

    let mismatches: Vec<FieldMismatch> = match stored {
        None => vec![
            FieldMismatch::new(ATTR_STATUS, Some(expected_status), None),
            FieldMismatch::new(ATTR_EXPIRATION_DATE, Some(expected_date), None),
        ],
        Some(stored) => {
            let mut mismatches: Vec<FieldMismatch> = Vec::new();
            if stored.status != projection.status {
                mismatches.push(FieldMismatch::new(
                    ATTR_STATUS,
                    Some(expected_status),
                    Some(stored.status.to_string()),
                ));
            }
            if stored.expiration_date != Some(projection.expiration_date) {
                mismatches.push(FieldMismatch::new(
                    ATTR_EXPIRATION_DATE,
                    Some(expected_date),
                    stored.expiration_date.as_ref().map(format_timestamp),
                ));
            }
            mismatches
        }
    };

    IdempotencyError::ConditionFailed {
        id: projection.id.clone(),
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp;

    fn date(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_expiration_update_rules() {
        let record: IdempotencyRecord = IdempotencyRecord::completed(
            "1/1/",
            "s3://b/1/1/",
            date("2024-01-10T00:00:00Z"),
            None,
        );
        assert!(expiration_update_allowed(&record, &date("2024-01-11T00:00:00Z")));
        assert!(!expiration_update_allowed(&record, &date("2024-01-10T00:00:00Z")));
        assert!(!expiration_update_allowed(
            &IdempotencyRecord::in_progress("1/1/"),
            &date("2024-01-11T00:00:00Z")
        ));
    }

    #[test]
    fn test_expiration_update_error_names_fields() {
        let mut record: IdempotencyRecord = IdempotencyRecord::completed(
            "1/1/",
            "s3://b/1/1/",
            date("2024-01-10T00:00:00Z"),
            None,
        );
        record.status = RecordStatus::Expired;

        match expiration_update_error("1/1/", Some(&record), &date("2024-01-09T00:00:00Z")) {
            IdempotencyError::ConditionFailed { mismatches, .. } => {
                let fields: Vec<&str> = mismatches.iter().map(|m| m.field.as_str()).collect();
                assert_eq!(fields, vec!["status", "expirationDate"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            expiration_update_error("1/1/", None, &date("2024-01-09T00:00:00Z")),
            IdempotencyError::RecordDoesNotExist { .. }
        ));
    }

    #[test]
    fn test_projection_error_carries_actual_values() {
        let record: IdempotencyRecord = IdempotencyRecord::completed(
            "43/1/",
            "s3://b/43/1/",
            date("2024-02-01T00:00:00Z"),
            None,
        );
        let mut projection: ExpirationProjection =
            ExpirationProjection::from_record(&record).unwrap();
        assert!(projection_matches(&projection, &record));

        projection.expiration_date = date("2024-01-01T00:00:00Z");
        assert!(!projection_matches(&projection, &record));
        match projection_error(&projection, Some(&record)) {
            IdempotencyError::ConditionFailed { mismatches, .. } => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(
                    mismatches[0].expected.as_deref(),
                    Some("2024-01-01T00:00:00.000000000Z")
                );
                assert_eq!(
                    mismatches[0].actual.as_deref(),
                    Some("2024-02-01T00:00:00.000000000Z")
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
