//! HTTP surface tests: routing, token handling and error status codes.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use board_core::ManualClock;
use board_server::{router, AppState, Board, ChangeNotifier, TOKEN_HEADER};
use board_storage::Database;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Helper building the router over a temporary store
async fn create_test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::open(dir.path().join("board.db"))
        .await
        .expect("Failed to open database");
    db.init_schema().await.expect("Failed to init schema");

    let board = Board::new(
        db,
        Arc::new(ChangeNotifier::new()),
        Arc::new(ManualClock::new(1_000_000)),
    );
    (router(AppState::new(board)), dir)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(TOKEN_HEADER, token);
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_list_issues_token() {
    let (app, _dir) = create_test_app().await;

    let (status, body) = send(&app, "GET", "/tasks", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["tasks"], json!([]));
    assert_eq!(body["deletedTasks"], json!([]));
    assert!(body["dt"].as_i64().unwrap() >= 1_000_000);

    let (_, again) = send(&app, "GET", "/tasks", Some("mine"), None).await;
    assert_eq!(again["token"], "mine");
}

#[tokio::test]
async fn test_create_then_list() {
    let (app, _dir) = create_test_app().await;

    let (status, created) = send(
        &app,
        "POST",
        "/tasks",
        None,
        Some(json!({"text": "Plan sprint", "col": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], 1);

    let (_, after) = send(
        &app,
        "POST",
        "/tasks",
        None,
        Some(json!({"text": "Next", "col": 1, "beforeId": 1})),
    )
    .await;
    assert_eq!(after["id"], 2);

    let (_, listing) = send(&app, "GET", "/tasks", Some("t1"), None).await;
    let tasks = listing["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["text"], "Plan sprint");
    assert_eq!(tasks[0]["col"], 1);
    assert_eq!(tasks[0]["sort"], 1000);
    assert_eq!(tasks[1]["sort"], 1500);
}

#[tokio::test]
async fn test_error_statuses() {
    let (app, _dir) = create_test_app().await;

    let (status, body) = send(&app, "POST", "/tasks", None, Some(json!({"text": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Text field must be filled");

    let (status, _) = send(&app, "PATCH", "/tasks/1/lock", Some("t1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/tasks", None, Some(json!({"text": "x"}))).await;

    let (status, body) = send(&app, "PATCH", "/tasks/1/lock", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "x-access-token header is required");

    let (status, _) = send(&app, "PATCH", "/tasks/1/lock", Some("t1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "PATCH", "/tasks/1/lock", Some("t2"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "The task is locked by someone else");

    let (status, _) = send(
        &app,
        "PATCH",
        "/tasks/1",
        Some("t2"),
        Some(json!({"text": "hijack"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_negotiation_routes() {
    let (app, _dir) = create_test_app().await;
    send(&app, "POST", "/tasks", None, Some(json!({"text": "x"}))).await;
    send(&app, "PATCH", "/tasks/1/lock", Some("t1"), None).await;

    let (status, _) = send(&app, "PATCH", "/tasks/1/send_unlock_request", Some("t2"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "PATCH", "/tasks/1/try_unlock", Some("t2"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "PATCH", "/tasks/1/allow_unlock", Some("t1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(&app, "GET", "/tasks", Some("t2"), None).await;
    assert_eq!(listing["tasks"][0]["edit_permission"], true);

    let (status, _) = send(
        &app,
        "PATCH",
        "/tasks/1/move",
        Some("t2"),
        Some(json!({"beforeId": null, "col": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", "/tasks/1", Some("t2"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(&app, "GET", "/tasks?since=0", Some("t2"), None).await;
    assert_eq!(listing["tasks"], json!([]));
    assert_eq!(listing["deletedTasks"], json!([1]));
}

#[tokio::test]
async fn test_health() {
    let (app, _dir) = create_test_app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["subscribers"], 0);
}

#[tokio::test]
async fn test_unlock_routes_without_token_are_silent() {
    let (app, _dir) = create_test_app().await;
    send(&app, "POST", "/tasks", None, Some(json!({"text": "x"}))).await;
    send(&app, "PATCH", "/tasks/1/lock", Some("t1"), None).await;

    let (status, _) = send(&app, "PATCH", "/tasks/1/unlock", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "PATCH", "/tasks/1/cancel_unlock_request", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(&app, "GET", "/tasks", Some("t1"), None).await;
    assert_eq!(listing["tasks"][0]["edit_permission"], true);
}
