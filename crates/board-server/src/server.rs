//! Axum routes for the task board

use crate::{board::ListQuery, error::ApiError, sse, Board};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, patch},
    Router,
};
use board_core::{Listing, TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

/// Header carrying the caller's access token
pub const TOKEN_HEADER: &str = "x-access-token";

/// Shared application state
pub struct AppState {
    pub board: Board,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(board: Board) -> SharedState {
        Arc::new(Self {
            board,
            started_at: Instant::now(),
        })
    }
}

/// Builds the HTTP router over `state`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", patch(update_task).delete(delete_task))
        .route("/tasks/:id/move", patch(move_task))
        .route("/tasks/:id/lock", patch(lock_task))
        .route("/tasks/:id/unlock", patch(unlock_task))
        .route("/tasks/:id/send_unlock_request", patch(send_unlock_request))
        .route("/tasks/:id/cancel_unlock_request", patch(cancel_unlock_request))
        .route("/tasks/:id/try_unlock", patch(try_unlock))
        .route("/tasks/:id/deny_unlock", patch(deny_unlock))
        .route("/tasks/:id/allow_unlock", patch(allow_unlock))
        .route("/events", get(sse::sse_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiResult<T> = Result<T, ApiError>;

fn token(headers: &HeaderMap) -> String {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Watermark of the caller's previous poll
    pub dt: Option<Timestamp>,
    /// Tombstone cutoff
    pub since: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub col: i64,
    pub before_id: Option<TaskId>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBody {
    pub before_id: Option<TaskId>,
    #[serde(default)]
    pub col: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: TaskId,
}

/// GET /tasks
async fn list_tasks(
    State(app): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Listing>> {
    let token = Some(token(&headers)).filter(|t| !t.is_empty());
    let query = ListQuery {
        since_watermark: params.dt,
        tombstone_cutoff: params.since,
    };
    Ok(Json(app.board.list(token, query).await?))
}

/// POST /tasks
async fn create_task(
    State(app): State<SharedState>,
    Json(body): Json<CreateBody>,
) -> ApiResult<Json<Created>> {
    let id = app.board.create(&body.text, body.col, body.before_id).await?;
    Ok(Json(Created { id }))
}

/// PATCH /tasks/:id
async fn update_task(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
    Json(body): Json<TextBody>,
) -> ApiResult<()> {
    Ok(app.board.update(id, &token(&headers), &body.text).await?)
}

/// DELETE /tasks/:id
async fn delete_task(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.delete(id, &token(&headers)).await?)
}

/// PATCH /tasks/:id/move
async fn move_task(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
    Json(body): Json<MoveBody>,
) -> ApiResult<()> {
    Ok(app
        .board
        .move_task(id, &token(&headers), body.before_id, body.col)
        .await?)
}

async fn lock_task(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.lock(id, &token(&headers)).await?)
}

async fn unlock_task(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.unlock(id, &token(&headers)).await?)
}

async fn send_unlock_request(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.request_unlock(id, &token(&headers)).await?)
}

async fn cancel_unlock_request(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.cancel_unlock_request(id, &token(&headers)).await?)
}

async fn try_unlock(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.try_unlock(id, &token(&headers)).await?)
}

async fn deny_unlock(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.deny_unlock(id, &token(&headers)).await?)
}

async fn allow_unlock(
    State(app): State<SharedState>,
    Path(id): Path<TaskId>,
    headers: HeaderMap,
) -> ApiResult<()> {
    Ok(app.board.allow_unlock(id, &token(&headers)).await?)
}

/// GET /health
async fn health(State(app): State<SharedState>) -> Json<serde_json::Value> {
    let notifier = app.board.notifier();
    Json(serde_json::json!({
        "status": "ok",
        "subscribers": notifier.subscriber_count(),
        "events_published": notifier.events_published(),
        "uptime_secs": app.started_at.elapsed().as_secs(),
    }))
}
