//! Rehydration attempt tracking.
//!
//! An optional audit table with one row per worker attempt. Unlike the
//! idempotency record, tracking rows are never deleted, so they keep the
//! history of failed attempts. Writers treat tracking failures as
//! non-fatal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rehydration_common::{DatasetVersion, User};
use serde::{Deserialize, Serialize};

use crate::error::IdempotencyError;
use crate::timestamp;

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    InProgress,
    Success,
    Failed,
}

impl TrackingStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::InProgress => "IN_PROGRESS",
            TrackingStatus::Success => "SUCCESS",
            TrackingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    /// `"{datasetId}/{versionId}/{taskArn}"`.
    pub id: String,
    pub dataset_id: i64,
    pub version_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub task_arn: String,
    pub status: TrackingStatus,
    #[serde(with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::required")]
    pub updated_at: DateTime<Utc>,
}

impl TrackingRecord {
    /// Start tracking an attempt.
    pub fn started(
        version: &DatasetVersion,
        user: &User,
        task_arn: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let task_arn: String = task_arn.into();
        Self {
            id: format!("{}{}", version.id(), task_arn),
            dataset_id: version.dataset_id,
            version_id: version.version_id,
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            task_arn,
            status: TrackingStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Store for attempt rows.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Write (or overwrite) an attempt row.
    async fn put_record(&self, record: &TrackingRecord) -> Result<(), IdempotencyError>;

    /// Record the final status of an attempt.
    async fn update_status(
        &self,
        id: &str,
        status: TrackingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), IdempotencyError>;
}

/// In-memory `TrackingStore`.
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    records: Mutex<HashMap<String, TrackingRecord>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a row by id.
    pub fn get(&self, id: &str) -> Option<TrackingRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    /// Every stored row.
    pub fn records(&self) -> Vec<TrackingRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn put_record(&self, record: &TrackingRecord) -> Result<(), IdempotencyError> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: TrackingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), IdempotencyError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(id) {
            Some(record) => {
                record.status = status;
                record.updated_at = updated_at;
                Ok(())
            }
            None => Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() }),
        }
    }
}
