//! Worker task entry point
//!
//! A worker is configured entirely through its environment and owns the
//! IN_PROGRESS record created by the admission handler that launched it.

use std::sync::Arc;

use rehydration_common::{DatasetVersion, DestinationLayout};
use rehydration_discover::{DiscoverSettings, HttpDiscoverClient};
use rehydration_idempotency::{
    DynamoDbConfig, DynamoDbIdempotencyStore, DynamoDbTrackingStore, IdempotencyStore,
};
use rehydration_service::{
    RecordLocator, RehydrationJob, RehydrationSettings, Rehydrator, WorkerDeployment,
    WorkerEnvironment,
};
use rehydration_storage::{CancellationToken, StorageSettings};
use rehydration_storage_s3::S3StorageClient;
use tracing::Instrument;

use crate::aws::load_sdk_config;
use crate::error::StartupError;
use crate::shutdown_signal;

/// Exit code when the rehydration failed.
pub const EXIT_REHYDRATION_FAILED: i32 = 1;
/// Exit code when the task environment is unusable.
pub const EXIT_INVALID_ENVIRONMENT: i32 = 2;

/// Run the worker described by the process environment.
///
/// # Returns
/// The process exit code.
pub async fn run() -> i32 {
    let environment: WorkerEnvironment = match WorkerEnvironment::from_process_env() {
        Ok(environment) => environment,
        Err(e) => {
            tracing::error!(error = %e, "invalid worker environment");
            if let Ok(locator) = RecordLocator::from_process_env() {
                let sdk_config = load_sdk_config(&locator.region).await;
                let store = DynamoDbIdempotencyStore::new(
                    &sdk_config,
                    DynamoDbConfig::new(&locator.idempotency_table).with_region(&locator.region),
                );
                release_record(&store, &locator.version).await;
            }
            return EXIT_INVALID_ENVIRONMENT;
        }
    };

    let span = tracing::info_span!(
        "worker",
        dataset_id = environment.version.dataset_id,
        version_id = environment.version.version_id,
    );
    run_environment(environment).instrument(span).await
}

async fn run_environment(environment: WorkerEnvironment) -> i32 {
    let deployment: &WorkerDeployment = &environment.deployment;
    let sdk_config = load_sdk_config(&deployment.region).await;
    let store: Arc<dyn IdempotencyStore> = Arc::new(DynamoDbIdempotencyStore::new(
        &sdk_config,
        DynamoDbConfig::new(&deployment.idempotency_table).with_region(&deployment.region),
    ));

    let rehydrator: Rehydrator = match build_rehydrator(&sdk_config, deployment, store.clone()) {
        Ok(rehydrator) => rehydrator,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize worker");
            release_record(store.as_ref(), &environment.version).await;
            return EXIT_REHYDRATION_FAILED;
        }
    };

    let mut job: RehydrationJob =
        RehydrationJob::new(environment.version, environment.user.clone());
    if let Some(ref task_arn) = environment.task_arn {
        job = job.with_task_arn(task_arn);
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("shutdown requested; cancelling rehydration");
        signal_cancel.cancel();
    });

    let result = rehydrator.run(&job, &cancel).await;
    watcher.abort();

    match result {
        Ok(report) => {
            tracing::info!(
                location = %report.location,
                files = report.statistics.files_copied,
                bytes = report.statistics.bytes_copied,
                "rehydration complete"
            );
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "rehydration failed");
            EXIT_REHYDRATION_FAILED
        }
    }
}

/// Delete the record of a worker that cannot run so the next request can retry.
pub async fn release_record(store: &dyn IdempotencyStore, version: &DatasetVersion) {
    let id: String = version.id();
    match store.delete_record(&id).await {
        Ok(()) => tracing::info!(record = %id, "released idempotency record"),
        Err(e) => tracing::error!(record = %id, error = %e, "failed to release idempotency record"),
    }
}

fn build_rehydrator(
    sdk_config: &aws_config::SdkConfig,
    deployment: &WorkerDeployment,
    store: Arc<dyn IdempotencyStore>,
) -> Result<Rehydrator, StartupError> {
    let storage = Arc::new(S3StorageClient::from_sdk_config(
        sdk_config,
        &StorageSettings {
            region: deployment.region.clone(),
            ..Default::default()
        },
    ));
    let discover = Arc::new(HttpDiscoverClient::new(DiscoverSettings::for_env(
        &deployment.env,
        deployment.discover_host.as_deref(),
    ))?);
    let settings: RehydrationSettings =
        RehydrationSettings::new(DestinationLayout::new(&deployment.bucket))
            .with_ttl_days(deployment.ttl_days);

    let mut rehydrator = Rehydrator::new(storage, store, discover, settings);
    if let Some(ref table) = deployment.tracking_table {
        let tracking = DynamoDbTrackingStore::new(
            sdk_config,
            DynamoDbConfig::new(table).with_region(&deployment.region),
        );
        rehydrator = rehydrator.with_tracking(Arc::new(tracking));
    }
    Ok(rehydrator)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rehydration_common::User;
    use rehydration_idempotency::{IdempotencyRecord, MemoryIdempotencyStore};

    use super::*;

    #[tokio::test]
    async fn test_unreadable_environment_releases_record() {
        let version = DatasetVersion::new(1234, 3);
        let store = MemoryIdempotencyStore::new();
        store.insert(IdempotencyRecord::in_progress(version.id()));

        let environment = WorkerEnvironment::new(
            version,
            User::new("Ada", "ada@example.com"),
            WorkerDeployment::new("dev", "idempotency", "us-east-1", "rehydration-bucket")
                .with_ttl_days(0),
        );
        let vars: HashMap<String, String> = environment.to_vars().into_iter().collect();
        assert!(WorkerEnvironment::from_lookup(|name| vars.get(name).cloned()).is_err());

        let locator: RecordLocator =
            RecordLocator::from_lookup(|name| vars.get(name).cloned()).unwrap();
        release_record(&store, &locator.version).await;

        assert!(store.get_record("1234/3/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_tolerates_store_outage() {
        let version = DatasetVersion::new(7, 1);
        let store = MemoryIdempotencyStore::new();
        store.insert(IdempotencyRecord::in_progress(version.id()));
        store.set_unavailable(true);

        release_record(&store, &version).await;

        store.set_unavailable(false);
        assert!(store.get_record("7/1/").await.unwrap().is_some());
    }
}
