//! Admission of rehydration requests.
//!
//! Arbitration happens entirely through the idempotency store's conditional
//! create: the caller that creates the IN_PROGRESS record owns the attempt
//! and launches a worker; everybody else answers from the stored record.
//!
//! | Stored record | Outcome                             |
//! |---------------|-------------------------------------|
//! | absent        | create, launch, `Started`           |
//! | IN_PROGRESS   | `InProgress` (409)                  |
//! | COMPLETED     | `Completed` with the location (200) |
//! | EXPIRED       | `Expired` (409)                     |

use std::sync::Arc;

use rehydration_common::{DatasetVersion, RehydrationRequest, User};
use rehydration_idempotency::{
    IdempotencyError, IdempotencyRecord, IdempotencyStore, RecordStatus,
};

use crate::config::AdmissionOptions;
use crate::error::AdmissionError;
use crate::launcher::TaskLauncher;

/// Successful answer to a rehydration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// A worker was launched for this request.
    Started { task_arn: String },
    /// The dataset version is already rehydrated.
    Completed { rehydration_location: String },
}

/// Admits rehydration requests and launches workers.
pub struct AdmissionHandler {
    store: Arc<dyn IdempotencyStore>,
    launcher: Arc<dyn TaskLauncher>,
    options: AdmissionOptions,
}

impl AdmissionHandler {
    pub fn new(store: Arc<dyn IdempotencyStore>, launcher: Arc<dyn TaskLauncher>) -> Self {
        Self {
            store,
            launcher,
            options: AdmissionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AdmissionOptions) -> Self {
        self.options = options;
        self
    }

    /// Admit one request.
    ///
    /// # Arguments
    /// * `request` - The raw request; validated before any store access
    ///
    /// # Returns
    /// `Started` if this call won the conditional create and launched a
    /// worker, `Completed` if the version is already rehydrated.
    ///
    /// # Errors
    /// * `Validation` - Malformed request
    /// * `InProgress` / `Expired` - Another attempt or an expiration holds the record
    /// * `Launch` - The worker could not be started; the record was rolled back
    /// * `InconsistentState` - The record kept vanishing between create and read
    pub async fn admit(
        &self,
        request: &RehydrationRequest,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let (version, user): (DatasetVersion, User) = request.validate()?;
        let id: String = version.id();
        let attempts: usize = self.options.max_retries + 1;

        for attempt in 1..=attempts {
            match self.store.save_in_progress(&id, None).await {
                Ok(_) => return self.start(&id, &version, &user).await,
                Err(IdempotencyError::RecordAlreadyExists { existing, .. }) => {
                    let stored: Option<IdempotencyRecord> = match existing {
                        Some(record) => Some(*record),
                        None => self.store.get_record(&id).await?,
                    };
                    match stored {
                        Some(record) => return Self::answer_existing(record),
                        None => {
                            log::debug!(
                                "Idempotency record {} vanished before it could be read (attempt {}/{})",
                                id,
                                attempt,
                                attempts
                            );
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::error!(
            "Giving up on {} after {} conflicting attempts",
            id,
            attempts
        );
        Err(AdmissionError::InconsistentState { id, attempts })
    }

    /// Launch a worker for a record this call just created.
    async fn start(
        &self,
        id: &str,
        version: &DatasetVersion,
        user: &User,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let task_arn: String = match self.launcher.launch(version, user).await {
            Ok(task_arn) => task_arn,
            Err(e) => {
                log::error!("Failed to launch worker for {}: {}", version, e);
                if let Err(delete_err) = self.store.delete_record(id).await {
                    log::error!(
                        "Failed to roll back idempotency record {}: {}",
                        id,
                        delete_err
                    );
                }
                return Err(e.into());
            }
        };

        // The worker may already have finished and deleted the record.
        if let Err(e) = self.store.set_task_arn(id, &task_arn).await {
            log::warn!("Failed to record task {} on {}: {}", task_arn, id, e);
        }

        log::info!(
            "Admitted rehydration of {} for {}; worker {}",
            version,
            user.email,
            task_arn
        );
        Ok(AdmissionOutcome::Started { task_arn })
    }

    fn answer_existing(record: IdempotencyRecord) -> Result<AdmissionOutcome, AdmissionError> {
        match record.status {
            RecordStatus::InProgress => Err(AdmissionError::InProgress { id: record.id }),
            RecordStatus::Expired => Err(AdmissionError::Expired { id: record.id }),
            RecordStatus::Completed => match record.rehydration_location {
                Some(rehydration_location) => Ok(AdmissionOutcome::Completed {
                    rehydration_location,
                }),
                None => Err(AdmissionError::Store(IdempotencyError::InvalidRecord {
                    id: record.id,
                    message: "COMPLETED record has no rehydrationLocation".to_string(),
                })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rehydration_idempotency::{ExpirationProjection, MemoryIdempotencyStore};

    use super::*;
    use crate::launcher::MemoryTaskLauncher;

    /// Reports every create as a duplicate whose record is never found.
    #[derive(Default)]
    struct VanishingStore {
        inner: MemoryIdempotencyStore,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl IdempotencyStore for VanishingStore {
        async fn save_in_progress(
            &self,
            id: &str,
            _task_arn: Option<&str>,
        ) -> Result<IdempotencyRecord, IdempotencyError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Err(IdempotencyError::RecordAlreadyExists {
                id: id.to_string(),
                existing: None,
            })
        }

        async fn get_record(
            &self,
            _id: &str,
        ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
            Ok(None)
        }

        async fn update_record(&self, record: &IdempotencyRecord) -> Result<(), IdempotencyError> {
            self.inner.update_record(record).await
        }

        async fn set_task_arn(&self, id: &str, task_arn: &str) -> Result<(), IdempotencyError> {
            self.inner.set_task_arn(id, task_arn).await
        }

        async fn delete_record(&self, id: &str) -> Result<(), IdempotencyError> {
            self.inner.delete_record(id).await
        }

        async fn expire_record(&self, id: &str) -> Result<(), IdempotencyError> {
            self.inner.expire_record(id).await
        }

        async fn set_expiration_date(
            &self,
            id: &str,
            date: DateTime<Utc>,
        ) -> Result<(), IdempotencyError> {
            self.inner.set_expiration_date(id, date).await
        }

        async fn query_expiration_index(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
            self.inner.query_expiration_index(now, limit).await
        }

        async fn query_expired_records(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<ExpirationProjection>, IdempotencyError> {
            self.inner.query_expired_records(now, limit).await
        }

        async fn expire_by_index(
            &self,
            projection: &ExpirationProjection,
        ) -> Result<IdempotencyRecord, IdempotencyError> {
            self.inner.expire_by_index(projection).await
        }
    }

    fn request() -> RehydrationRequest {
        RehydrationRequest::new(DatasetVersion::new(12, 3), User::new("Ada", "ada@example.com"))
    }

    fn handler(
        store: &Arc<MemoryIdempotencyStore>,
        launcher: &Arc<MemoryTaskLauncher>,
    ) -> AdmissionHandler {
        AdmissionHandler::new(store.clone(), launcher.clone())
    }

    #[tokio::test]
    async fn test_first_request_starts_worker() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());

        let outcome: AdmissionOutcome = handler(&store, &launcher).admit(&request()).await.unwrap();
        let task_arn: String = match outcome {
            AdmissionOutcome::Started { task_arn } => task_arn,
            other => panic!("expected Started, got {:?}", other),
        };

        let record: IdempotencyRecord = store.get_record("12/3/").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::InProgress);
        assert_eq!(record.task_arn, Some(task_arn));
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_second_request_is_in_progress() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        let handler = handler(&store, &launcher);

        handler.admit(&request()).await.unwrap();
        let err: AdmissionError = handler.admit(&request()).await.unwrap_err();
        assert!(matches!(err, AdmissionError::InProgress { .. }));
        assert_eq!(err.status_code(), 409);
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_completed_returns_location() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        store.insert(IdempotencyRecord::completed(
            "12/3/",
            "s3://dest/12/3/",
            Utc::now(),
            None,
        ));

        let outcome: AdmissionOutcome = handler(&store, &launcher).admit(&request()).await.unwrap();
        assert_eq!(
            outcome,
            AdmissionOutcome::Completed {
                rehydration_location: "s3://dest/12/3/".to_string()
            }
        );
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_is_conflict() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        let mut record: IdempotencyRecord =
            IdempotencyRecord::completed("12/3/", "s3://dest/12/3/", Utc::now(), None);
        record.status = RecordStatus::Expired;
        store.insert(record);

        let err: AdmissionError = handler(&store, &launcher)
            .admit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Expired { .. }));
    }

    #[tokio::test]
    async fn test_launch_failure_rolls_back() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        launcher.set_failing(true);

        let err: AdmissionError = handler(&store, &launcher)
            .admit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Launch(_)));
        assert!(store.get_record("12/3/").await.unwrap().is_none());

        launcher.set_failing(false);
        let outcome: AdmissionOutcome = handler(&store, &launcher).admit(&request()).await.unwrap();
        assert!(matches!(outcome, AdmissionOutcome::Started { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_never_touches_store() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        let bad = RehydrationRequest::new(DatasetVersion::new(0, 3), User::new("Ada", "ada@example.com"));

        let err: AdmissionError = handler(&store, &launcher).admit(&bad).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_is_server_error() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let launcher = Arc::new(MemoryTaskLauncher::new());
        store.set_unavailable(true);

        let err: AdmissionError = handler(&store, &launcher)
            .admit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Store(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_vanishing_record_exhausts_retries() {
        let store = Arc::new(VanishingStore::default());
        let launcher = Arc::new(MemoryTaskLauncher::new());

        let err: AdmissionError = AdmissionHandler::new(store.clone(), launcher.clone())
            .admit(&request())
            .await
            .unwrap_err();

        match err {
            AdmissionError::InconsistentState { ref id, attempts } => {
                assert_eq!(id, "12/3/");
                assert_eq!(attempts, 3);
            }
            ref other => panic!("expected InconsistentState, got {:?}", other),
        }
        assert_eq!(err.status_code(), 500);
        assert_eq!(store.creates.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.launch_count(), 0);
    }
}
