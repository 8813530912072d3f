use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rehydration_common::DestinationLayout;
use rehydration_idempotency::{IdempotencyRecord, MemoryIdempotencyStore, RecordStatus};
use rehydration_server::routes::build_router;
use rehydration_server::AppState;
use rehydration_service::{AdmissionHandler, ExpirationSweeper, MemoryTaskLauncher};
use rehydration_storage::MemoryStorageClient;
use serde_json::Value as JsonValue;
use tower::ServiceExt;

struct TestApp {
    state: Arc<AppState>,
    store: Arc<MemoryIdempotencyStore>,
    storage: Arc<MemoryStorageClient>,
    launcher: Arc<MemoryTaskLauncher>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryIdempotencyStore::new());
    let storage = Arc::new(MemoryStorageClient::new());
    let launcher = Arc::new(MemoryTaskLauncher::new());
    let admission = AdmissionHandler::new(store.clone(), launcher.clone());
    let sweeper = ExpirationSweeper::new(
        store.clone(),
        storage.clone(),
        DestinationLayout::new("rehydration-bucket"),
    );
    TestApp {
        state: Arc::new(AppState::new(admission, sweeper)),
        store,
        storage,
        launcher,
    }
}

async fn json_body(resp: Response<Body>) -> (StatusCode, JsonValue) {
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let json: JsonValue = serde_json::from_slice(&bytes).expect("valid JSON response");
    (status, json)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const REQUEST: &str =
    r#"{"datasetId":1234,"datasetVersionId":3,"user":{"name":"Ada","email":"ada@example.com"}}"#;

#[tokio::test]
async fn health_check_ok() {
    let app = test_app();
    let resp = build_router(app.state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn rehydrate_starts_then_conflicts() {
    let app = test_app();
    let router = build_router(app.state.clone());

    let resp = router
        .clone()
        .oneshot(post_json("/rehydrate", REQUEST))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_arn = json.get("taskARN").and_then(|v| v.as_str()).unwrap();
    assert_eq!(app.launcher.launched()[0].2, task_arn);

    let resp = router.oneshot(post_json("/rehydrate", REQUEST)).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json.get("error").and_then(|v| v.as_str()), Some("InProgress"));
    assert!(json.get("message").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn rehydrate_returns_existing_location() {
    let app = test_app();
    app.store.insert(IdempotencyRecord::completed(
        "1234/3/",
        "s3://rehydration-bucket/1234/3/",
        Utc::now() + Duration::days(1),
        None,
    ));

    let resp = build_router(app.state)
        .oneshot(post_json("/rehydrate", REQUEST))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json.get("rehydrationLocation").and_then(|v| v.as_str()),
        Some("s3://rehydration-bucket/1234/3/")
    );
    assert_eq!(app.launcher.launch_count(), 0);
}

#[tokio::test]
async fn rehydrate_rejects_invalid_requests() {
    let app = test_app();
    let router = build_router(app.state);

    let resp = router
        .clone()
        .oneshot(post_json(
            "/rehydrate",
            r#"{"datasetId":1234,"user":{"name":"Ada","email":"ada@example.com"}}"#,
        ))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json.get("error").and_then(|v| v.as_str()),
        Some("ValidationError")
    );

    let resp = router
        .oneshot(post_json("/rehydrate", "not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.records().is_empty());
}

#[tokio::test]
async fn rehydrate_store_outage_is_500() {
    let app = test_app();
    app.store.set_unavailable(true);

    let resp = build_router(app.state)
        .oneshot(post_json("/rehydrate", REQUEST))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json.get("error").and_then(|v| v.as_str()), Some("StoreError"));
}

#[tokio::test]
async fn expire_sweeps_due_records() {
    let app = test_app();
    app.store.insert(IdempotencyRecord::completed(
        "43/1/",
        "s3://rehydration-bucket/43/1/",
        Utc::now() - Duration::hours(24),
        None,
    ));
    for n in 0..101 {
        app.storage
            .put_object("rehydration-bucket", &format!("rehydrated/43/1/{}.dat", n), 1);
    }

    let resp = build_router(app.state)
        .oneshot(post_json("/expire", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(app
        .storage
        .keys("rehydration-bucket", "rehydrated/43/1/")
        .is_empty());
    assert!(app.store.records().is_empty());
}

#[tokio::test]
async fn expire_reports_incomplete_cleanup() {
    let app = test_app();
    app.store.insert(IdempotencyRecord::completed(
        "43/1/",
        "s3://rehydration-bucket/43/1/",
        Utc::now() - Duration::hours(24),
        None,
    ));
    app.storage.fail_listing();

    let resp = build_router(app.state)
        .oneshot(post_json("/expire", ""))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json.get("error").and_then(|v| v.as_str()),
        Some("SweepIncomplete")
    );
    assert_eq!(app.store.records()[0].status, RecordStatus::Expired);
}
