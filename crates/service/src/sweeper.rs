//! Expiration sweeper.
//!
//! Reclaims rehydrated copies whose TTL has passed:
//!
//! ```text
//! COMPLETED ──expire_by_index──► EXPIRED ──purge clean──► absent
//!                                   │
//!                                   └──objects left──► EXPIRED (retried next sweep)
//! ```
//!
//! Moving to EXPIRED first makes new requests answer 409 while objects are
//! being deleted, so a request can never observe a half-purged location.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rehydration_common::{DestinationLayout, RehydrationLocation};
use rehydration_idempotency::{ExpirationProjection, IdempotencyStore};
use rehydration_storage::{purge_prefix, DeleteBatchResult, StorageClient};

use crate::config::SweepOptions;
use crate::error::SweepError;

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records returned by the index queries.
    pub examined: usize,
    /// Records this sweep moved from COMPLETED to EXPIRED.
    pub expired: usize,
    /// Records that changed under the sweep and were skipped.
    pub conflicts: usize,
    /// Objects deleted from the destination bucket.
    pub objects_deleted: usize,
    /// Records fully reclaimed and deleted.
    pub records_deleted: usize,
    /// Records left EXPIRED because some objects could not be deleted.
    pub left_expired: usize,
    /// Records whose cleanup failed outright.
    pub failed: usize,
}

impl SweepReport {
    /// Whether every examined record was handled without failure.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// What happened to one EXPIRED record.
enum Reclaim {
    Deleted { objects: usize },
    Partial { objects: usize },
    Failed,
}

/// Expires and purges rehydrations past their TTL.
pub struct ExpirationSweeper {
    store: Arc<dyn IdempotencyStore>,
    storage: Arc<dyn StorageClient>,
    layout: DestinationLayout,
    options: SweepOptions,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        storage: Arc<dyn StorageClient>,
        layout: DestinationLayout,
    ) -> Self {
        Self {
            store,
            storage,
            layout,
            options: SweepOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one sweep.
    ///
    /// # Arguments
    /// * `now` - Records with an expiration date at or before this instant are due
    ///
    /// # Returns
    /// Counters describing the sweep. Per-record storage failures are
    /// counted in `failed` and do not stop the sweep.
    ///
    /// # Errors
    /// `SweepError::Store` if an index query or a non-conditional store
    /// write fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport::default();
        let mut handled: HashSet<String> = HashSet::new();

        let due: Vec<ExpirationProjection> = self
            .store
            .query_expiration_index(now, self.options.limit)
            .await?;
        log::info!("Expiration sweep found {} due records", due.len());

        for projection in due {
            report.examined += 1;
            handled.insert(projection.id.clone());

            match self.store.expire_by_index(&projection).await {
                Ok(_) => report.expired += 1,
                Err(e) if e.is_conflict() => {
                    log::info!("Skipping {}: changed since it was queried ({})", projection.id, e);
                    report.conflicts += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            self.reclaim(&projection, &mut report).await?;
        }

        if self.options.retry_expired {
            let stranded: Vec<ExpirationProjection> = self
                .store
                .query_expired_records(now, self.options.limit)
                .await?;
            for projection in stranded {
                if !handled.insert(projection.id.clone()) {
                    continue;
                }
                report.examined += 1;
                log::info!("Retrying cleanup of expired record {}", projection.id);
                self.reclaim(&projection, &mut report).await?;
            }
        }

        log::info!(
            "Expiration sweep done: {} examined, {} expired, {} records deleted, {} objects deleted, {} left expired, {} failed",
            report.examined,
            report.expired,
            report.records_deleted,
            report.objects_deleted,
            report.left_expired,
            report.failed
        );
        Ok(report)
    }

    /// Purge an EXPIRED record's objects and delete it once nothing is left.
    async fn reclaim(
        &self,
        projection: &ExpirationProjection,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        match self.purge(projection).await {
            Reclaim::Deleted { objects } => {
                report.objects_deleted += objects;
                self.store
                    .delete_record(&projection.id)
                    .await
                    .map_err(SweepError::from)?;
                report.records_deleted += 1;
            }
            Reclaim::Partial { objects } => {
                report.objects_deleted += objects;
                report.left_expired += 1;
            }
            Reclaim::Failed => report.failed += 1,
        }
        Ok(())
    }

    async fn purge(&self, projection: &ExpirationProjection) -> Reclaim {
        let Some(uri) = projection.rehydration_location.as_deref() else {
            log::warn!("Expired record {} has no location; nothing to purge", projection.id);
            return Reclaim::Deleted { objects: 0 };
        };

        let location: RehydrationLocation = match RehydrationLocation::parse(uri) {
            Ok(location) => location,
            Err(e) => {
                log::error!(
                    "Expired record {} has an unusable location '{}': {}",
                    projection.id,
                    uri,
                    e
                );
                return Reclaim::Failed;
            }
        };

        let prefix: String = self.layout.purge_prefix(&location);
        let result: DeleteBatchResult =
            match purge_prefix(self.storage.as_ref(), &location.bucket, &prefix).await {
                Ok(result) => result,
                Err(e) => {
                    log::error!(
                        "Failed to purge s3://{}/{} for {}: {}",
                        location.bucket,
                        prefix,
                        projection.id,
                        e
                    );
                    return Reclaim::Failed;
                }
            };

        if result.errors.is_empty() {
            log::info!(
                "Purged {} objects of {} from s3://{}/{}",
                result.deleted,
                projection.id,
                location.bucket,
                prefix
            );
            Reclaim::Deleted {
                objects: result.deleted,
            }
        } else {
            for err in &result.errors {
                log::warn!(
                    "Could not delete {} for {}: {} {}",
                    err.key,
                    projection.id,
                    err.code,
                    err.message
                );
            }
            Reclaim::Partial {
                objects: result.deleted,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rehydration_idempotency::{IdempotencyRecord, MemoryIdempotencyStore, RecordStatus};
    use rehydration_storage::MemoryStorageClient;

    use super::*;

    fn layout() -> DestinationLayout {
        DestinationLayout::new("dest")
    }

    fn completed(id: &str, location: &str, expiration: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord::completed(id, location, expiration, None)
    }

    fn sweeper(
        store: &Arc<MemoryIdempotencyStore>,
        storage: &Arc<MemoryStorageClient>,
    ) -> ExpirationSweeper {
        ExpirationSweeper::new(store.clone(), storage.clone(), layout())
    }

    #[tokio::test]
    async fn test_sweep_purges_and_deletes_due_records() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let storage = Arc::new(MemoryStorageClient::new());
        let now: DateTime<Utc> = Utc::now();
        store.insert(completed("5/1/", "s3://dest/5/1/", now - Duration::hours(1)));
        store.insert(completed("5/2/", "s3://dest/5/2/", now + Duration::days(1)));
        for i in 0..3 {
            storage.put_object("dest", &format!("rehydrated/5/1/f{}.dat", i), 1);
        }
        storage.put_object("dest", "rehydrated/5/2/keep.dat", 1);

        let report: SweepReport = sweeper(&store, &storage).sweep(now).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.records_deleted, 1);
        assert_eq!(report.objects_deleted, 3);
        assert!(store.get_record("5/1/").await.unwrap().is_none());
        assert!(store.get_record("5/2/").await.unwrap().is_some());
        assert_eq!(storage.keys("dest", "rehydrated/5/"), vec!["rehydrated/5/2/keep.dat"]);
    }

    #[tokio::test]
    async fn test_denied_delete_leaves_record_expired() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let storage = Arc::new(MemoryStorageClient::new());
        let now: DateTime<Utc> = Utc::now();
        store.insert(completed("6/1/", "s3://dest/6/1/", now - Duration::hours(1)));
        storage.put_object("dest", "rehydrated/6/1/a.dat", 1);
        storage.put_object("dest", "rehydrated/6/1/b.dat", 1);
        storage.deny_delete("rehydrated/6/1/b.dat");

        let report: SweepReport = sweeper(&store, &storage).sweep(now).await.unwrap();
        assert_eq!(report.left_expired, 1);
        assert_eq!(report.records_deleted, 0);
        let record: IdempotencyRecord = store.get_record("6/1/").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Expired);

        // Next sweep finishes the job once the object can be deleted.
        let storage_retry = Arc::new(MemoryStorageClient::new());
        storage_retry.put_object("dest", "rehydrated/6/1/b.dat", 1);
        let report: SweepReport = sweeper(&store, &storage_retry).sweep(now).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.expired, 0);
        assert_eq!(report.records_deleted, 1);
        assert!(store.get_record("6/1/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_failure_counts_as_failed() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let storage = Arc::new(MemoryStorageClient::new());
        let now: DateTime<Utc> = Utc::now();
        store.insert(completed("7/1/", "s3://dest/7/1/", now - Duration::hours(1)));
        storage.fail_listing();

        let report: SweepReport = sweeper(&store, &storage).sweep(now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        let record: IdempotencyRecord = store.get_record("7/1/").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Expired);
    }

    #[tokio::test]
    async fn test_store_outage_fails_sweep() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let storage = Arc::new(MemoryStorageClient::new());
        store.set_unavailable(true);

        let result = sweeper(&store, &storage).sweep(Utc::now()).await;
        assert!(matches!(result, Err(SweepError::Store(_))));
    }

    #[tokio::test]
    async fn test_nothing_due_is_clean_noop() {
        let store = Arc::new(MemoryIdempotencyStore::new());
        let storage = Arc::new(MemoryStorageClient::new());

        let report: SweepReport = sweeper(&store, &storage).sweep(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(storage.counters().delete_objects, 0);
    }
}
