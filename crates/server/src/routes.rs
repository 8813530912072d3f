//! HTTP route handlers and router configuration

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rehydration_common::RehydrationRequest;
use rehydration_service::{AdmissionOutcome, SweepReport};
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rehydrate", post(rehydrate))
        .route("/expire", post(expire))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StartedResponse {
    #[serde(rename = "taskARN")]
    pub task_arn: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedResponse {
    pub rehydration_location: String,
}

/// POST /rehydrate
///
/// 202 with the worker's task ARN when a rehydration starts, 200 with the
/// location when the version is already rehydrated.
pub async fn rehydrate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RehydrationRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(request) = body?;
    let outcome: AdmissionOutcome = state.admission.admit(&request).await?;

    let response = match outcome {
        AdmissionOutcome::Started { task_arn } => {
            tracing::info!(task_arn = %task_arn, "rehydration started");
            (StatusCode::ACCEPTED, Json(StartedResponse { task_arn })).into_response()
        }
        AdmissionOutcome::Completed {
            rehydration_location,
        } => (
            StatusCode::OK,
            Json(CompletedResponse {
                rehydration_location,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// POST /expire
///
/// 204 once every due record was handled; 500 if the sweep failed or some
/// record could not be cleaned up.
pub async fn expire(State(state): State<Arc<AppState>>) -> Result<StatusCode, ServerError> {
    let report: SweepReport = state.sweeper.sweep(Utc::now()).await?;
    if report.is_clean() {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SweepIncomplete {
            failed: report.failed,
        })
    }
}
