//! REST API implementation for the task scheduling service
//!
//! This module provides the HTTP endpoints clients use to submit tasks,
//! observe their progress (optionally long-polling for changes), list tasks
//! as JSONL, and request cancellation. A per-client sliding-window rate
//! limiter runs as a middleware layer ahead of every task route.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::stream;
use serde_json::Value;
use shared::api::{
    endpoints, error_codes, headers, ErrorResponse, SubmitTaskRequest, TaskStatus, TaskSummary,
};
use shared::defaults;
use shared::params::{self, ValidationIssue};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::rate_limiter::RateLimiter;
use crate::task_manager::{CancelError, TaskManager};

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    /// Task manager owning the table, queue, and worker pool
    pub task_manager: Arc<TaskManager>,
    /// Per-client request limiter applied at the edge
    pub rate_limiter: Arc<RateLimiter>,
}

/// Creates the main API router and defines all the application's routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::TASKS,
            axum::routing::post(create_task).get(list_tasks),
        )
        .route(endpoints::TASK_BY_ID, get(get_task).delete(cancel_task))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        // The health endpoint sits outside the rate limit layer so probes
        // never count against a client's budget.
        .route(endpoints::HEALTH, get(health_check))
        .with_state(state)
}

/// Derives the rate-limit key for a request: the first `x-forwarded-for`
/// value, falling back to the peer address, else "unknown".
fn client_key(headers: &HeaderMap, peer: Option<&str>) -> String {
    if let Some(forwarded) = headers
        .get(headers::X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
    {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    peer.map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

fn request_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(headers::X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Middleware enforcing the sliding-window limit before any handler runs.
async fn enforce_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let key = client_key(request.headers(), peer.as_deref());

    if !state.rate_limiter.allow(&key).await {
        warn!(client = %key, "Rate limit exceeded");
        let request_id = request_id_from(request.headers());
        return ApiError::RateLimited.with_request_id(request_id).into_response();
    }

    next.run(request).await
}

/// The handler for the `/health` endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "task-scheduling-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ---------------------------------
// POST /api/v1/tasks  (create_task)
// ---------------------------------
async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let request_id = request_id_from(&headers);
    match create_task_inner(&state, payload).await {
        Ok(response) => response,
        Err(error) => error.with_request_id(request_id).into_response(),
    }
}

async fn create_task_inner(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::Validation(vec![ValidationIssue::new("body", rejection.body_text())])
    })?;
    let request: SubmitTaskRequest = serde_json::from_value(payload).map_err(|e| {
        ApiError::Validation(vec![ValidationIssue::new("body", e.to_string())])
    })?;

    let mut issues = Vec::new();
    if !params::is_registered(&request.task_type) {
        issues.push(ValidationIssue::new(
            "task_type",
            format!("Unknown task type '{}'", request.task_type),
        ));
    }
    let priority = request.priority.unwrap_or(0);
    if !(0..=10).contains(&priority) {
        issues.push(ValidationIssue::new(
            "priority",
            "Priority must be between 0 and 10",
        ));
    }
    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    let parameters = params::validate_parameters(&request.task_type, &request.parameters)
        .map_err(ApiError::Validation)?;

    let task_info = state
        .task_manager
        .submit(&request.task_type, parameters, priority as u8)
        .await
        .map_err(|_| ApiError::QueueFull)?;

    info!(
        task_id = %task_info.task_id,
        task_type = %task_info.task_type,
        priority = priority,
        "Task accepted"
    );

    let summary = TaskSummary {
        task_id: task_info.task_id,
        status: task_info.status,
    };
    Ok((StatusCode::ACCEPTED, Json(summary)).into_response())
}

// ----------------------------------------
// GET /api/v1/tasks/{task_id}  (get_task)
// ----------------------------------------
async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request_id = request_id_from(&headers);
    match get_task_inner(&state, &task_id, &query).await {
        Ok(response) => response,
        Err(error) => error.with_request_id(request_id).into_response(),
    }
}

async fn get_task_inner(
    state: &AppState,
    task_id: &str,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(task_id)?;
    let wait = parse_wait(query)?;
    let timeout_seconds = parse_timeout(query)?;

    let Some((snapshot, mut changed)) = state.task_manager.watch(task_id).await else {
        return Err(ApiError::NotFound("Task not found".to_string()));
    };

    if wait && !snapshot.status.is_terminal() {
        // Wake on the next observable change or give back the current state
        // on timeout; either way the record is re-read afterwards.
        let _ = tokio::time::timeout(Duration::from_secs(timeout_seconds), changed.changed()).await;
        if let Some(current) = state.task_manager.get(task_id).await {
            return Ok(Json(current).into_response());
        }
    }

    Ok(Json(snapshot).into_response())
}

// -------------------------------
// GET /api/v1/tasks  (list_tasks)
// -------------------------------
async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request_id = request_id_from(&headers);
    match list_tasks_inner(&state, &query).await {
        Ok(response) => response,
        Err(error) => error.with_request_id(request_id).into_response(),
    }
}

async fn list_tasks_inner(
    state: &AppState,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let status_filter = match query.get("status") {
        None => None,
        Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
            ApiError::Validation(vec![ValidationIssue::new(
                "status",
                format!("Invalid status '{raw}'"),
            )])
        })?),
    };
    let limit = match query.get("limit") {
        None => defaults::default_list_limit(),
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) if (1..=1000).contains(&limit) => limit,
            _ => {
                return Err(ApiError::Validation(vec![ValidationIssue::new(
                    "limit",
                    "Limit must be an integer between 1 and 1000",
                )]))
            }
        },
    };

    let snapshot = state.task_manager.list(status_filter, limit).await;

    // Stream the snapshot as JSON Lines; the body is produced lazily so a
    // slow client never holds the task table lock.
    let lines = stream::iter(snapshot.into_iter().map(|task_info| {
        serde_json::to_string(&task_info)
            .map(|line| axum::body::Bytes::from(line + "\n"))
            .map_err(std::io::Error::other)
    }));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/jsonl")
        .body(Body::from_stream(lines))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}

// ------------------------------------------
// DELETE /api/v1/tasks/{task_id}  (cancel)
// ------------------------------------------
async fn cancel_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request_id = request_id_from(&headers);
    match cancel_task_inner(&state, &task_id, &query).await {
        Ok(response) => response,
        Err(error) => error.with_request_id(request_id).into_response(),
    }
}

async fn cancel_task_inner(
    state: &AppState,
    task_id: &str,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(task_id)?;
    let wait = parse_wait(query)?;
    let timeout_seconds = parse_timeout(query)?;

    let mut task_info = match state.task_manager.cancel(task_id).await {
        Ok(task_info) => task_info,
        Err(CancelError::NotFound) => {
            return Err(ApiError::NotFound("Task not found".to_string()))
        }
        Err(e @ CancelError::NotCancellable { .. }) => {
            return Err(ApiError::NotFound(e.to_string()))
        }
    };

    info!(
        task_id = %task_id,
        status = %task_info.status,
        "Cancellation requested"
    );

    if wait && task_info.status == TaskStatus::Processing {
        if let Some((snapshot, mut changed)) = state.task_manager.watch(task_id).await {
            if snapshot.status == TaskStatus::Processing {
                let _ =
                    tokio::time::timeout(Duration::from_secs(timeout_seconds), changed.changed())
                        .await;
            }
            task_info = match state.task_manager.get(task_id).await {
                Some(current) => current,
                None => snapshot,
            };
        }
    }

    // 202 while the worker has not yet honoured the flag, 200 otherwise.
    let status = if task_info.status == TaskStatus::Processing {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(task_info)).into_response())
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    // A malformed id is indistinguishable from a missing task to clients.
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound("Task not found".to_string()))
}

fn parse_wait(query: &HashMap<String, String>) -> Result<bool, ApiError> {
    match query.get("wait").map(String::as_str) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(ApiError::Validation(vec![ValidationIssue::new(
            "wait",
            format!("Invalid boolean '{other}'"),
        )])),
    }
}

fn parse_timeout(query: &HashMap<String, String>) -> Result<u64, ApiError> {
    match query.get("timeout") {
        None => Ok(defaults::default_long_poll_timeout_seconds()),
        Some(raw) => match raw.parse::<u64>() {
            Ok(timeout) if (1..=60).contains(&timeout) => Ok(timeout),
            _ => Err(ApiError::Validation(vec![ValidationIssue::new(
                "timeout",
                "Timeout must be an integer between 1 and 60",
            )])),
        },
    }
}

/// Custom error types for the API.
///
/// Every failure is rendered through the standardized error envelope
/// `{code, message, details?, request_id?}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid request")]
    Validation(Vec<ValidationIssue>),
    #[error("Rate limit exceeded (max requests per window).")]
    RateLimited,
    #[error("Task queue is full. Try again later.")]
    QueueFull,
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, error_codes::RATE_LIMITED),
            // Queue saturation surfaces as a generic HTTP failure with a
            // retry hint, matching the published contract.
            ApiError::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, error_codes::HTTP_ERROR),
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }

    /// Attaches the caller's request id before rendering the envelope.
    pub fn with_request_id(self, request_id: Option<String>) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self,
            request_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.with_request_id(None).into_response()
    }
}

/// An `ApiError` paired with the request id it should echo back.
pub struct ApiErrorResponse {
    error: ApiError,
    request_id: Option<String>,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let (status, code) = self.error.status_and_code();
        let details = match &self.error {
            ApiError::Validation(issues) => serde_json::to_value(issues).ok(),
            _ => None,
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message: self.error.to_string(),
            details,
            request_id: self.request_id,
        };
        (status, Json(body)).into_response()
    }
}
