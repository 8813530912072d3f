//! End-to-end flows over in-memory backends: admission, worker, sweeper.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rehydration_common::{DatasetVersion, DestinationLayout, RehydrationRequest, User};
use rehydration_discover::MemoryDiscoverClient;
use rehydration_idempotency::{
    IdempotencyRecord, IdempotencyStore, MemoryIdempotencyStore, MemoryTrackingStore,
    RecordStatus, TrackingStatus,
};
use rehydration_service::{
    AdmissionError, AdmissionHandler, AdmissionOutcome, ExpirationSweeper, MemoryNotifier,
    MemoryTaskLauncher, Notification, RehydrationError, RehydrationJob, RehydrationReport,
    RehydrationSettings, Rehydrator, SweepReport,
};
use rehydration_storage::{CancellationToken, MemoryStorageClient, StorageClient};

const DEST_BUCKET: &str = "rehydration-bucket";
const SOURCE_BUCKET: &str = "source-bucket";

struct Harness {
    storage: Arc<MemoryStorageClient>,
    store: Arc<MemoryIdempotencyStore>,
    discover: Arc<MemoryDiscoverClient>,
    launcher: Arc<MemoryTaskLauncher>,
    notifier: Arc<MemoryNotifier>,
    tracking: Arc<MemoryTrackingStore>,
}

impl Harness {
    fn new() -> Self {
        Self {
            storage: Arc::new(MemoryStorageClient::new()),
            store: Arc::new(MemoryIdempotencyStore::new()),
            discover: Arc::new(MemoryDiscoverClient::new()),
            launcher: Arc::new(MemoryTaskLauncher::new()),
            notifier: Arc::new(MemoryNotifier::new()),
            tracking: Arc::new(MemoryTrackingStore::new()),
        }
    }

    fn layout() -> DestinationLayout {
        DestinationLayout::new(DEST_BUCKET)
    }

    /// Register a dataset whose files live at `files/{n}.dat` with size `100 + n`.
    fn seed_dataset(&self, version: DatasetVersion, files: usize) {
        let prefix: String = format!("datasets/{}/", version.dataset_id);
        self.discover
            .add_dataset(version, format!("s3://{}/{}", SOURCE_BUCKET, prefix));
        for n in 0..files {
            let path: String = format!("files/{}.dat", n);
            let key: String = format!("{}{}", prefix, path);
            let size: u64 = 100 + n as u64;
            let object_version: String = self.storage.put_object(SOURCE_BUCKET, &key, size);
            self.discover.add_file(
                version,
                &path,
                format!("s3://{}/{}", SOURCE_BUCKET, key),
                size,
                Some(object_version.as_str()),
            );
        }
    }

    fn admission(&self) -> AdmissionHandler {
        AdmissionHandler::new(self.store.clone(), self.launcher.clone())
    }

    fn rehydrator(&self) -> Rehydrator {
        Rehydrator::new(
            self.storage.clone(),
            self.store.clone(),
            self.discover.clone(),
            RehydrationSettings::new(Self::layout()),
        )
        .with_notifier(self.notifier.clone())
        .with_tracking(self.tracking.clone())
    }

    fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(self.store.clone(), self.storage.clone(), Self::layout())
    }

    /// Run the worker for the most recent launch.
    async fn run_last_worker(&self) -> Result<RehydrationReport, RehydrationError> {
        let (version, user, task_arn) = self
            .launcher
            .launched()
            .pop()
            .expect("no worker was launched");
        let job: RehydrationJob = RehydrationJob::new(version, user).with_task_arn(task_arn);
        self.rehydrator().run(&job, &CancellationToken::new()).await
    }
}

fn user() -> User {
    User::new("Ada Lovelace", "ada@example.com")
}

fn request(version: DatasetVersion) -> RehydrationRequest {
    RehydrationRequest::new(version, user())
}

#[tokio::test]
async fn test_cold_start_then_duplicates() {
    let harness = Harness::new();
    let version = DatasetVersion::new(1234, 3);
    harness.seed_dataset(version, 50);
    let admission: AdmissionHandler = harness.admission();

    let outcome: AdmissionOutcome = admission.admit(&request(version)).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Started { .. }));

    // Duplicate while the worker is still pending.
    let err: AdmissionError = admission.admit(&request(version)).await.unwrap_err();
    assert!(matches!(err, AdmissionError::InProgress { .. }));
    assert_eq!(err.status_code(), 409);

    let report: RehydrationReport = harness.run_last_worker().await.unwrap();
    assert_eq!(report.statistics.files_copied, 50);
    assert_eq!(
        report.location.to_string(),
        "s3://rehydration-bucket/1234/3/"
    );

    for n in 0..50u64 {
        let key: String = format!("rehydrated/1234/3/files/{}.dat", n);
        let size: Option<u64> = harness.storage.head_object(DEST_BUCKET, &key).await.unwrap();
        assert_eq!(size, Some(100 + n));
    }

    let record: IdempotencyRecord = harness.store.get_record("1234/3/").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert!(record.expiration_date.is_some());

    // Duplicate after completion answers from the record.
    let outcome: AdmissionOutcome = admission.admit(&request(version)).await.unwrap();
    assert_eq!(
        outcome,
        AdmissionOutcome::Completed {
            rehydration_location: "s3://rehydration-bucket/1234/3/".to_string()
        }
    );
    assert_eq!(harness.launcher.launch_count(), 1);

    assert!(matches!(harness.notifier.sent()[0], Notification::Complete(_)));
    let tracked = harness.tracking.records();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].status, TrackingStatus::Success);
}

#[tokio::test]
async fn test_single_copy_failure_deletes_record_and_retry_succeeds() {
    let harness = Harness::new();
    let version = DatasetVersion::new(1234, 3);
    harness.seed_dataset(version, 50);
    harness.storage.fail_copies_ending_with("files/17.dat");
    let admission: AdmissionHandler = harness.admission();

    admission.admit(&request(version)).await.unwrap();
    let err: RehydrationError = harness.run_last_worker().await.unwrap_err();
    match err {
        RehydrationError::CopyFailed {
            failed,
            total,
            ref first_error,
        } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 50);
            assert!(first_error.contains("17.dat"));
        }
        other => panic!("expected CopyFailed, got {:?}", other),
    }
    assert!(harness.store.get_record("1234/3/").await.unwrap().is_none());
    assert!(matches!(
        harness.notifier.sent()[0],
        Notification::Failed(_, _)
    ));
    assert_eq!(harness.tracking.records()[0].status, TrackingStatus::Failed);

    harness.storage.clear_failures();
    let outcome: AdmissionOutcome = admission.admit(&request(version)).await.unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Started { .. }));
    assert_eq!(harness.launcher.launch_count(), 2);

    let report: RehydrationReport = harness.run_last_worker().await.unwrap();
    assert_eq!(report.statistics.files_copied, 50);
    assert_eq!(
        harness
            .storage
            .object_size(DEST_BUCKET, "rehydrated/1234/3/files/17.dat"),
        Some(117)
    );
}

#[tokio::test]
async fn test_discover_failure_writes_nothing() {
    let harness = Harness::new();
    let version = DatasetVersion::new(77, 1);
    harness.seed_dataset(version, 5);
    harness.discover.fail_metadata(version, 500);

    harness.admission().admit(&request(version)).await.unwrap();
    let err: RehydrationError = harness.run_last_worker().await.unwrap_err();

    assert!(matches!(err, RehydrationError::Discover(_)));
    assert!(harness.store.get_record("77/1/").await.unwrap().is_none());
    assert_eq!(harness.storage.counters().writes(), 0);
    assert!(harness.storage.keys(DEST_BUCKET, "").is_empty());
}

#[tokio::test]
async fn test_file_lookup_failure_copies_nothing() {
    let harness = Harness::new();
    let version = DatasetVersion::new(78, 2);
    harness.seed_dataset(version, 5);
    harness.discover.fail_file("files/3.dat");

    harness.admission().admit(&request(version)).await.unwrap();
    let err: RehydrationError = harness.run_last_worker().await.unwrap_err();

    match err {
        RehydrationError::Discover(ref e) => assert_eq!(e.status(), Some(500)),
        other => panic!("expected Discover, got {:?}", other),
    }
    assert!(harness.store.get_record("78/2/").await.unwrap().is_none());
    assert_eq!(harness.storage.counters().writes(), 0);
    assert!(harness.storage.keys(DEST_BUCKET, "").is_empty());
    assert!(matches!(
        harness.notifier.sent()[0],
        Notification::Failed(_, _)
    ));
}

#[tokio::test]
async fn test_concurrent_admission_launches_once() {
    let harness = Harness::new();
    let version = DatasetVersion::new(9, 9);
    let admission = Arc::new(harness.admission());

    let first = {
        let admission = admission.clone();
        tokio::spawn(async move { admission.admit(&request(version)).await })
    };
    let second = {
        let admission = admission.clone();
        tokio::spawn(async move { admission.admit(&request(version)).await })
    };
    let results = vec![first.await.unwrap(), second.await.unwrap()];

    let started: usize = results
        .iter()
        .filter(|r| matches!(r, Ok(AdmissionOutcome::Started { .. })))
        .count();
    let in_progress: usize = results
        .iter()
        .filter(|r| matches!(r, Err(AdmissionError::InProgress { .. })))
        .count();
    assert_eq!(started, 1);
    assert_eq!(in_progress, 1);
    assert_eq!(harness.launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_expiration_purges_only_due_versions() {
    let harness = Harness::new();
    let now: DateTime<Utc> = Utc::now();

    harness.store.insert(IdempotencyRecord::completed(
        "43/1/",
        "s3://rehydration-bucket/43/1/",
        now - Duration::hours(24),
        None,
    ));
    harness.store.insert(IdempotencyRecord::completed(
        "43/11/",
        "s3://rehydration-bucket/43/11/",
        now + Duration::hours(24),
        None,
    ));
    for n in 0..101 {
        harness
            .storage
            .put_object(DEST_BUCKET, &format!("rehydrated/43/1/f{}.dat", n), 1);
    }
    for n in 0..10 {
        harness
            .storage
            .put_object(DEST_BUCKET, &format!("rehydrated/43/11/f{}.dat", n), 1);
    }

    let report: SweepReport = harness.sweeper().sweep(now).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.objects_deleted, 101);
    assert_eq!(report.records_deleted, 1);

    assert!(harness.storage.keys(DEST_BUCKET, "rehydrated/43/1/").is_empty());
    assert_eq!(
        harness.storage.keys(DEST_BUCKET, "rehydrated/43/11/").len(),
        10
    );
    assert!(harness.store.get_record("43/1/").await.unwrap().is_none());
    assert!(harness.store.get_record("43/11/").await.unwrap().is_some());

    // A request for the purged version starts over.
    let outcome: AdmissionOutcome = harness
        .admission()
        .admit(&request(DatasetVersion::new(43, 1)))
        .await
        .unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Started { .. }));
}

#[tokio::test]
async fn test_notifier_failure_keeps_completed_record() {
    let harness = Harness::new();
    let version = DatasetVersion::new(5, 5);
    harness.seed_dataset(version, 3);
    harness.notifier.set_failing(true);

    harness.admission().admit(&request(version)).await.unwrap();
    harness.run_last_worker().await.unwrap();

    let record: IdempotencyRecord = harness.store.get_record("5/5/").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(
        record.rehydration_location.as_deref(),
        Some("s3://rehydration-bucket/5/5/")
    );
}
