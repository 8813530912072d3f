//! Idempotency record model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdempotencyError;
use crate::timestamp;

/// Lifecycle state of an idempotency record.
///
/// Transitions: absent → IN_PROGRESS → (COMPLETED | absent);
/// COMPLETED → EXPIRED → absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    InProgress,
    Completed,
    Expired,
}

impl RecordStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::InProgress => "IN_PROGRESS",
            RecordStatus::Completed => "COMPLETED",
            RecordStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(RecordStatus::InProgress),
            "COMPLETED" => Ok(RecordStatus::Completed),
            "EXPIRED" => Ok(RecordStatus::Expired),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// The single persisted row that serializes requests for one dataset version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    /// Dataset-version id, `"{datasetId}/{versionId}/"`.
    pub id: String,
    pub status: RecordStatus,
    /// Destination URI; set once a rehydration has produced output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rehydration_location: Option<String>,
    /// Worker task that owns the record.
    #[serde(rename = "taskARN", default, skip_serializing_if = "Option::is_none")]
    pub task_arn: Option<String>,
    /// Set iff the status is COMPLETED or EXPIRED.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// A fresh IN_PROGRESS record.
    pub fn in_progress(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RecordStatus::InProgress,
            rehydration_location: None,
            task_arn: None,
            expiration_date: None,
        }
    }

    /// A COMPLETED record, as written by a worker at finalize.
    pub fn completed(
        id: impl Into<String>,
        location: impl Into<String>,
        expiration_date: DateTime<Utc>,
        task_arn: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: RecordStatus::Completed,
            rehydration_location: Some(location.into()),
            task_arn,
            expiration_date: Some(expiration_date),
        }
    }

    /// Set the owning task.
    pub fn with_task_arn(mut self, task_arn: impl Into<String>) -> Self {
        self.task_arn = Some(task_arn.into());
        self
    }

    /// Check the per-record invariants.
    ///
    /// # Errors
    /// `InvalidRecord` when COMPLETED lacks a location, or when the
    /// expiration date is present for IN_PROGRESS or absent otherwise.
    pub fn validate(&self) -> Result<(), IdempotencyError> {
        let invalid = |message: &str| IdempotencyError::InvalidRecord {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id is empty"));
        }
        match self.status {
            RecordStatus::InProgress if self.expiration_date.is_some() => {
                Err(invalid("IN_PROGRESS record must not have an expiration date"))
            }
            RecordStatus::Completed
                if self
                    .rehydration_location
                    .as_deref()
                    .map_or(true, str::is_empty) =>
            {
                Err(invalid("COMPLETED record must have a rehydration location"))
            }
            RecordStatus::Completed | RecordStatus::Expired if self.expiration_date.is_none() => {
                Err(invalid("expiration date is required once COMPLETED"))
            }
            _ => Ok(()),
        }
    }
}

/// Projection of a record as held by the expiration index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationProjection {
    pub id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rehydration_location: Option<String>,
    #[serde(with = "timestamp::required")]
    pub expiration_date: DateTime<Utc>,
}

impl ExpirationProjection {
    /// Project a record; None when it carries no expiration date.
    pub fn from_record(record: &IdempotencyRecord) -> Option<Self> {
        Some(Self {
            id: record.id.clone(),
            status: record.status,
            rehydration_location: record.rehydration_location.clone(),
            expiration_date: record.expiration_date?,
        })
    }

    /// Whether the record is past due and eligible for expiration at `now`.
    pub fn is_due(&self, now: &DateTime<Utc>) -> bool {
        self.status == RecordStatus::Completed && self.expiration_date <= *now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn expiration() -> DateTime<Utc> {
        timestamp::parse_timestamp("2024-05-06T07:08:09.123456789Z").unwrap()
    }

    #[test]
    fn test_record_json_round_trip() {
        let record: IdempotencyRecord = IdempotencyRecord::completed(
            "1234/3/",
            "s3://rehydration-bucket/1234/3/",
            expiration(),
            Some("arn:aws:ecs:us-east-1:123:task/abc".to_string()),
        );

        let json: String = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"taskARN\""));
        assert!(json.contains("\"rehydrationLocation\""));
        assert!(json.contains("\"2024-05-06T07:08:09.123456789Z\""));
        assert!(json.contains("\"COMPLETED\""));

        let parsed: IdempotencyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.expiration_date, Some(expiration()));
    }

    #[test]
    fn test_in_progress_omits_unset_fields() {
        let json: String = serde_json::to_string(&IdempotencyRecord::in_progress("1/2/")).unwrap();
        assert_eq!(json, r#"{"id":"1/2/","status":"IN_PROGRESS"}"#);
    }

    #[test]
    fn test_validate() {
        assert!(IdempotencyRecord::in_progress("1/2/").validate().is_ok());

        let mut record: IdempotencyRecord =
            IdempotencyRecord::completed("1/2/", "s3://b/1/2/", expiration(), None);
        assert!(record.validate().is_ok());

        record.rehydration_location = None;
        assert!(matches!(
            record.validate(),
            Err(IdempotencyError::InvalidRecord { .. })
        ));

        let mut record: IdempotencyRecord = IdempotencyRecord::in_progress("1/2/");
        record.expiration_date = Some(expiration());
        assert!(record.validate().is_err());

        let mut record: IdempotencyRecord =
            IdempotencyRecord::completed("1/2/", "s3://b/1/2/", expiration(), None);
        record.status = RecordStatus::Expired;
        record.expiration_date = None;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_status_string_forms() {
        for status in [
            RecordStatus::InProgress,
            RecordStatus::Completed,
            RecordStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_projection_is_due() {
        let record: IdempotencyRecord =
            IdempotencyRecord::completed("43/1/", "s3://b/43/1/", expiration(), None);
        let projection: ExpirationProjection = ExpirationProjection::from_record(&record).unwrap();

        let after: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let before: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(projection.is_due(&after));
        assert!(projection.is_due(&expiration()));
        assert!(!projection.is_due(&before));

        assert!(ExpirationProjection::from_record(&IdempotencyRecord::in_progress("x/")).is_none());
    }
}
