//! One-shot and periodic expiration sweeps

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rehydration_idempotency::DynamoDbIdempotencyStore;
use rehydration_service::{ExpirationSweeper, SweepOptions};
use rehydration_storage_s3::S3StorageClient;
use tokio::task::JoinHandle;

use crate::aws::{load_sdk_config, storage_settings};
use crate::config::SweepConfig;
use crate::state::AppState;

/// Run one sweep against AWS.
///
/// # Returns
/// The process exit code: 0 when every due record was handled.
pub async fn run_once(config: &SweepConfig) -> i32 {
    let sdk_config = load_sdk_config(&config.aws.region).await;
    let store = Arc::new(DynamoDbIdempotencyStore::new(
        &sdk_config,
        config.store.dynamodb_config(&config.aws),
    ));
    let storage = Arc::new(S3StorageClient::from_sdk_config(
        &sdk_config,
        &storage_settings(&config.aws),
    ));
    let sweeper = ExpirationSweeper::new(store, storage, config.store.layout())
        .with_options(SweepOptions::default().with_limit(config.sweep_limit));

    match sweeper.sweep(Utc::now()).await {
        Ok(report) if report.is_clean() => 0,
        Ok(report) => {
            tracing::error!(failed = report.failed, "expiration sweep incomplete");
            1
        }
        Err(e) => {
            tracing::error!(error = %e, "expiration sweep failed");
            1
        }
    }
}

/// Sweep every `interval` until the task is aborted.
pub fn spawn_periodic(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so startup is not a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.sweeper.sweep(Utc::now()).await {
                Ok(report) => tracing::debug!(
                    examined = report.examined,
                    records_deleted = report.records_deleted,
                    failed = report.failed,
                    "periodic sweep finished"
                ),
                Err(e) => tracing::error!(error = %e, "periodic sweep failed"),
            }
        }
    })
}
