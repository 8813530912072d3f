//! Dataset rehydration server
//!
//! One binary, three roles:
//!
//! - `serve`: HTTP front door (`POST /rehydrate`, `POST /expire`, `GET /health`)
//! - `worker`: one rehydration, configured through the task environment
//! - `sweep`: one expiration sweep for external schedulers

pub mod aws;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod sweep;
pub mod telemetry;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

pub use config::{Cli, Command, ServeConfig, SweepConfig};
pub use error::{ServerError, StartupError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Errors
/// `StartupError` if the state cannot be built or the listener cannot bind.
pub async fn serve(config: ServeConfig) -> Result<(), StartupError> {
    let state = Arc::new(AppState::from_config(&config).await?);
    let sweep_task = config
        .sweep_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| sweep::spawn_periodic(state.clone(), Duration::from_secs(secs)));

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        launcher = ?config.launcher,
        bucket = %config.store.bucket,
        table = %config.store.idempotency_table,
        sweep_interval_secs = ?config.sweep_interval_secs,
        "Rehydration server starting"
    );

    let result = axum::serve(listener, routes::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(task) = sweep_task {
        task.abort();
    }
    result.map_err(StartupError::from)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
