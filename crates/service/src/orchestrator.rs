//! Rehydration orchestrator.
//!
//! Runs inside a worker task and owns exactly one IN_PROGRESS idempotency
//! record. The worker's view of the record lifecycle:
//!
//! ```text
//! IN_PROGRESS ──all files copied──► COMPLETED (location, expirationDate)
//!      │
//!      └──any failure──► absent (next request retries from scratch)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use rehydration_common::{DatasetVersion, RehydrationLocation, User};
use rehydration_discover::{
    DatasetFile, DatasetFileEntry, DatasetMetadata, DiscoverClient, ObjectUri,
};
use rehydration_idempotency::{
    IdempotencyRecord, IdempotencyStore, RecordStatus, TrackingRecord, TrackingStatus,
    TrackingStore,
};
use rehydration_storage::{
    CancellationToken, CopyEngine, CopyStatistics, DestinationObject, FileResult, ObjectCopier,
    RehydrationUnit, SourceObject, StorageClient,
};
use tokio::sync::OnceCell;

use crate::config::RehydrationSettings;
use crate::error::RehydrationError;
use crate::notifier::{LogNotifier, Notifier, RehydrationNotice};

/// One rehydration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RehydrationJob {
    pub version: DatasetVersion,
    pub user: User,
    /// Identity of this worker, when known.
    pub task_arn: Option<String>,
}

impl RehydrationJob {
    pub fn new(version: DatasetVersion, user: User) -> Self {
        Self {
            version,
            user,
            task_arn: None,
        }
    }

    pub fn with_task_arn(mut self, task_arn: impl Into<String>) -> Self {
        self.task_arn = Some(task_arn.into());
        self
    }
}

/// Outcome of a successful attempt.
#[derive(Debug, Clone)]
pub struct RehydrationReport {
    pub location: RehydrationLocation,
    pub expiration_date: DateTime<Utc>,
    pub statistics: CopyStatistics,
}

/// Copies one dataset version and finalizes its idempotency record.
pub struct Rehydrator {
    storage: Arc<dyn StorageClient>,
    store: Arc<dyn IdempotencyStore>,
    discover: Arc<dyn DiscoverClient>,
    notifier: Arc<dyn Notifier>,
    tracking: Option<Arc<dyn TrackingStore>>,
    settings: RehydrationSettings,
}

impl Rehydrator {
    /// Create an orchestrator that notifies through the log.
    pub fn new(
        storage: Arc<dyn StorageClient>,
        store: Arc<dyn IdempotencyStore>,
        discover: Arc<dyn DiscoverClient>,
        settings: RehydrationSettings,
    ) -> Self {
        Self {
            storage,
            store,
            discover,
            notifier: Arc::new(LogNotifier),
            tracking: None,
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_tracking(mut self, tracking: Arc<dyn TrackingStore>) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn settings(&self) -> &RehydrationSettings {
        &self.settings
    }

    /// Run one attempt end to end.
    ///
    /// On success the record becomes COMPLETED. On any failure after the
    /// record has been confirmed IN_PROGRESS, the record is deleted so the
    /// next request can retry. Notification and tracking failures are
    /// logged only.
    ///
    /// # Errors
    /// The first failure of the attempt.
    pub async fn run(
        &self,
        job: &RehydrationJob,
        cancel: &CancellationToken,
    ) -> Result<RehydrationReport, RehydrationError> {
        let id: String = job.version.id();
        let stored: Option<IdempotencyRecord> = self.store.get_record(&id).await?;
        let task_arn: Option<String> = match stored {
            Some(record) if record.status == RecordStatus::InProgress => {
                job.task_arn.clone().or(record.task_arn)
            }
            other => {
                let err = RehydrationError::NotInProgress {
                    id,
                    status: other.map(|record| record.status),
                };
                log::error!("Refusing to rehydrate {}: {}", job.version, err);
                return Err(err);
            }
        };

        log::info!("Starting rehydration of dataset {}", job.version);
        let tracking_id: Option<String> = self.track_start(job, task_arn.as_deref()).await;

        let outcome: Result<RehydrationReport, RehydrationError> =
            match self.rehydrate(&job.version, cancel).await {
                Ok((location, statistics)) => {
                    self.finalize_success(job, location, statistics, task_arn)
                        .await
                }
                Err(e) => Err(e),
            };

        match outcome {
            Ok(report) => {
                let notice = RehydrationNotice {
                    version: job.version,
                    user: job.user.clone(),
                    location: Some(report.location.to_string()),
                };
                if let Err(e) = self.notifier.rehydration_complete(&notice).await {
                    log::warn!("Failed to notify completion of {}: {}", job.version, e);
                }
                self.track_finish(tracking_id.as_deref(), TrackingStatus::Success)
                    .await;
                Ok(report)
            }
            Err(err) => {
                self.finalize_failure(job, &err).await;
                self.track_finish(tracking_id.as_deref(), TrackingStatus::Failed)
                    .await;
                Err(err)
            }
        }
    }

    /// Resolve sources and copy every file.
    async fn rehydrate(
        &self,
        version: &DatasetVersion,
        cancel: &CancellationToken,
    ) -> Result<(RehydrationLocation, CopyStatistics), RehydrationError> {
        if cancel.is_cancelled() {
            return Err(RehydrationError::Cancelled);
        }

        let metadata: DatasetMetadata = self
            .discover
            .get_dataset_metadata_by_version(version)
            .await?;
        let units: Vec<RehydrationUnit> = self.resolve_units(version, &metadata.files).await?;
        log::info!(
            "Resolved {} files of dataset {}; starting copies",
            units.len(),
            version
        );

        let copier = ObjectCopier::new(self.storage.as_ref()).with_options(self.settings.copy.clone());
        let results: Vec<FileResult> = CopyEngine::new(&copier)
            .with_workers(self.settings.copy.max_workers)
            .run(units, cancel)
            .await;

        let statistics: CopyStatistics = CopyStatistics::from_results(&results);
        if let Some(first) = results.iter().find_map(|result| result.error.as_ref()) {
            if cancel.is_cancelled() {
                return Err(RehydrationError::Cancelled);
            }
            return Err(RehydrationError::CopyFailed {
                failed: statistics.files_failed,
                total: statistics.files_processed,
                first_error: first.to_string(),
            });
        }

        Ok((self.settings.layout.location(version), statistics))
    }

    /// Resolve every file to a versioned source and its destination.
    ///
    /// Fails on the first lookup error, before any copy is submitted.
    async fn resolve_units(
        &self,
        version: &DatasetVersion,
        files: &[DatasetFileEntry],
    ) -> Result<Vec<RehydrationUnit>, RehydrationError> {
        let dataset_uri: OnceCell<String> = OnceCell::new();
        let dataset_uri: &OnceCell<String> = &dataset_uri;

        futures::stream::iter(files)
            .map(|entry| self.resolve_unit(version, entry, dataset_uri))
            .buffered(self.settings.resolve_workers.max(1))
            .try_collect()
            .await
    }

    async fn resolve_unit(
        &self,
        version: &DatasetVersion,
        entry: &DatasetFileEntry,
        dataset_uri: &OnceCell<String>,
    ) -> Result<RehydrationUnit, RehydrationError> {
        let file: DatasetFile = self
            .discover
            .get_dataset_file_by_version(version, &entry.path)
            .await?;

        let object: ObjectUri = if ObjectUri::is_relative(&file.uri) {
            let base: &String = dataset_uri
                .get_or_try_init(|| async {
                    self.discover
                        .get_dataset_by_version(version)
                        .await
                        .map(|info| info.uri)
                })
                .await?;
            ObjectUri::resolve(&file.uri, base)?
        } else {
            ObjectUri::parse(&file.uri)?
        };

        let source = SourceObject {
            path: entry.path.clone(),
            name: file.name,
            size: file.size,
            bucket: object.bucket,
            key: object.key,
            version_id: file.s3_version_id,
        };
        let destination = DestinationObject::new(
            self.settings.layout.bucket.clone(),
            self.settings.layout.destination_key(version, &entry.path),
        );
        Ok(RehydrationUnit {
            source,
            destination,
        })
    }

    async fn finalize_success(
        &self,
        job: &RehydrationJob,
        location: RehydrationLocation,
        statistics: CopyStatistics,
        task_arn: Option<String>,
    ) -> Result<RehydrationReport, RehydrationError> {
        let id: String = job.version.id();

        // The admission handler may have recorded the task ARN after we read it.
        let task_arn: Option<String> = match task_arn {
            Some(task_arn) => Some(task_arn),
            None => self
                .store
                .get_record(&id)
                .await?
                .and_then(|record| record.task_arn),
        };

        let expiration_date: DateTime<Utc> = Utc::now() + self.settings.ttl;
        let record: IdempotencyRecord =
            IdempotencyRecord::completed(id, location.to_string(), expiration_date, task_arn);
        self.store.update_record(&record).await?;

        log::info!(
            "Rehydration of dataset {} complete: {} files, {} bytes at {} (expires {})",
            job.version,
            statistics.files_copied,
            statistics.bytes_copied,
            location,
            expiration_date
        );
        Ok(RehydrationReport {
            location,
            expiration_date,
            statistics,
        })
    }

    /// Roll the record back and notify. Errors are logged only.
    async fn finalize_failure(&self, job: &RehydrationJob, err: &RehydrationError) {
        log::error!("Rehydration of dataset {} failed: {}", job.version, err);

        if let Err(e) = self.store.delete_record(&job.version.id()).await {
            log::error!(
                "Failed to delete idempotency record {} after failure: {}",
                job.version.id(),
                e
            );
        }

        let notice = RehydrationNotice {
            version: job.version,
            user: job.user.clone(),
            location: None,
        };
        if let Err(e) = self
            .notifier
            .rehydration_failed(&notice, &err.to_string())
            .await
        {
            log::warn!("Failed to notify failure of {}: {}", job.version, e);
        }
    }

    async fn track_start(&self, job: &RehydrationJob, task_arn: Option<&str>) -> Option<String> {
        let tracking = self.tracking.as_ref()?;
        let Some(task_arn) = task_arn else {
            log::debug!("No task ARN known for {}; skipping tracking", job.version);
            return None;
        };

        let record: TrackingRecord =
            TrackingRecord::started(&job.version, &job.user, task_arn, Utc::now());
        match tracking.put_record(&record).await {
            Ok(()) => Some(record.id),
            Err(e) => {
                log::warn!("Failed to write tracking record {}: {}", record.id, e);
                None
            }
        }
    }

    async fn track_finish(&self, tracking_id: Option<&str>, status: TrackingStatus) {
        let (Some(tracking), Some(id)) = (self.tracking.as_ref(), tracking_id) else {
            return;
        };
        if let Err(e) = tracking.update_status(id, status, Utc::now()).await {
            log::warn!("Failed to update tracking record {}: {}", id, e);
        }
    }
}
