//! In-memory idempotency store.
//!
//! Every operation runs under one lock, which gives the same per-key
//! serializability as the conditional writes of the DynamoDB backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backend::IdempotencyStore;
use crate::conditions::{
    expiration_update_allowed, expiration_update_error, projection_error, projection_matches,
};
use crate::error::IdempotencyError;
use crate::record::{ExpirationProjection, IdempotencyRecord, RecordStatus};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, IdempotencyRecord>,
    unavailable: bool,
}

/// In-memory `IdempotencyStore` for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryIdempotencyStore {
    state: Mutex<MemoryState>,
}

impl MemoryIdempotencyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record unconditionally (test seeding).
    pub fn insert(&self, record: IdempotencyRecord) {
        let mut state = self.state.lock().unwrap();
        state.records.insert(record.id.clone(), record);
    }

    /// Snapshot of every stored record.
    pub fn records(&self) -> Vec<IdempotencyRecord> {
        let state = self.state.lock().unwrap();
        state.records.values().cloned().collect()
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    fn check_available(state: &MemoryState) -> Result<(), IdempotencyError> {
        if state.unavailable {
            return Err(IdempotencyError::dynamodb("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn save_in_progress(
        &self,
        id: &str,
        task_arn: Option<&str>,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        if let Some(existing) = state.records.get(id) {
            return Err(IdempotencyError::RecordAlreadyExists {
                id: id.to_string(),
                existing: Some(Box::new(existing.clone())),
            });
        }

        let mut record: IdempotencyRecord = IdempotencyRecord::in_progress(id);
        record.task_arn = task_arn.map(String::from);
        state.records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_record(&self, id: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.records.get(id).cloned())
    }

    async fn update_record(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError> {
        record.validate()?;

        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        match state.records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(IdempotencyError::RecordDoesNotExist {
                id: record.id.clone(),
            }),
        }
    }

    async fn set_task_arn(&self, id: &str, task_arn: &str) -> Result<(), IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        match state.records.get_mut(id) {
            Some(stored) => {
                stored.task_arn = Some(task_arn.to_string());
                Ok(())
            }
            None => Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() }),
        }
    }

    async fn delete_record(&self, id: &str) -> Result<(), IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        state.records.remove(id);
        Ok(())
    }

    async fn expire_record(&self, id: &str) -> Result<(), IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        match state.records.get_mut(id) {
            Some(stored) => {
                stored.status = RecordStatus::Expired;
                Ok(())
            }
            None => Err(IdempotencyError::RecordDoesNotExist { id: id.to_string() }),
        }
    }

    async fn set_expiration_date(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> Result<(), IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        match state.records.get_mut(id) {
            Some(stored) if expiration_update_allowed(stored, &date) => {
                stored.expiration_date = Some(date);
                Ok(())
            }
            _ => Err(expiration_update_error(id, state.records.get(id), &date)),
        }
    }

    async fn query_expiration_index(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        Ok(state
            .records
            .values()
            .filter_map(ExpirationProjection::from_record)
            .filter(|projection| projection.is_due(&now))
            .take(limit)
            .collect())
    }

    async fn query_expired_records(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        Ok(state
            .records
            .values()
            .filter(|record| record.status == RecordStatus::Expired)
            .filter_map(ExpirationProjection::from_record)
            .filter(|projection| projection.expiration_date <= now)
            .take(limit)
            .collect())
    }

    async fn expire_by_index(
        &self,
        projection: &ExpirationProjection,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        match state.records.get_mut(&projection.id) {
            Some(stored) if projection_matches(projection, stored) => {
                stored.status = RecordStatus::Expired;
                Ok(stored.clone())
            }
            _ => Err(projection_error(
                projection,
                state.records.get(&projection.id),
            )),
        }
    }
}
