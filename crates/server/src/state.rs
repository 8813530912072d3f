//! Shared request-handler state

use std::sync::Arc;

use rehydration_idempotency::{DynamoDbIdempotencyStore, IdempotencyStore};
use rehydration_service::{
    AdmissionHandler, EcsTaskLauncher, ExpirationSweeper, ProcessTaskLauncher, TaskLauncher,
};
use rehydration_storage::StorageClient;
use rehydration_storage_s3::S3StorageClient;

use crate::aws::{load_sdk_config, storage_settings};
use crate::config::{LauncherKind, ServeConfig};
use crate::error::StartupError;

/// Application state shared across request handlers
pub struct AppState {
    pub admission: AdmissionHandler,
    pub sweeper: ExpirationSweeper,
}

impl AppState {
    pub fn new(admission: AdmissionHandler, sweeper: ExpirationSweeper) -> Self {
        Self { admission, sweeper }
    }

    /// Build the AWS-backed state for `serve`.
    ///
    /// # Errors
    /// `StartupError` if the launcher cannot be configured.
    pub async fn from_config(config: &ServeConfig) -> Result<Self, StartupError> {
        let sdk_config = load_sdk_config(&config.aws.region).await;

        let store: Arc<dyn IdempotencyStore> = Arc::new(DynamoDbIdempotencyStore::new(
            &sdk_config,
            config.store.dynamodb_config(&config.aws),
        ));
        let storage: Arc<dyn StorageClient> = Arc::new(S3StorageClient::from_sdk_config(
            &sdk_config,
            &storage_settings(&config.aws),
        ));
        let launcher: Arc<dyn TaskLauncher> = match config.launcher {
            LauncherKind::Ecs => Arc::new(EcsTaskLauncher::new(
                &sdk_config,
                config.ecs_config()?,
                config.deployment(),
            )),
            LauncherKind::Process => {
                Arc::new(ProcessTaskLauncher::current_exe(config.deployment())?)
            }
        };

        let admission = AdmissionHandler::new(store.clone(), launcher)
            .with_options(config.admission_options());
        let sweeper = ExpirationSweeper::new(store, storage, config.store.layout())
            .with_options(config.sweep_options());
        Ok(Self::new(admission, sweeper))
    }
}
