//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Json, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use switchboard_orchestrator::{
    DispatcherStats, DispatcherStatsSnapshot, LifecycleSnapshot, ModelLifecycle, QueueMetrics, Task,
    TaskQueue,
};
use tracing::{info, warn};

/// Body returned for any submission that fails validation.
pub const MISSING_FIELDS: &str = "Missing required fields.";

/// Body message returned once a task is queued.
pub const TASK_QUEUED: &str = "Task added to queue.";

/// Shared application state
pub struct AppState {
    pub queue: TaskQueue,
    pub lifecycle: Arc<ModelLifecycle>,
    pub stats: Arc<DispatcherStats>,
}

impl AppState {
    pub fn new(queue: TaskQueue, lifecycle: Arc<ModelLifecycle>, stats: Arc<DispatcherStats>) -> Self {
        Self { queue, lifecycle, stats }
    }
}

/// Task submission body. Fields are optional so that a missing field gets the
/// same 400 as an empty one.
#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task_type: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskAccepted {
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub lifecycle: LifecycleSnapshot,
    pub queue: QueueMetrics,
    pub dispatcher: DispatcherStatsSnapshot,
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: MISSING_FIELDS.to_string() })).into_response()
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Validate a submission and put it on the queue
pub async fn perform_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return bad_request();
    };

    let task = match Task::try_new(
        request.task_type.unwrap_or_default(),
        request.model_name.unwrap_or_default(),
        request.prompt.unwrap_or_default(),
    ) {
        Ok(task) => task,
        Err(e) => {
            warn!(error = %e, "Rejected task submission");
            return bad_request();
        }
    };

    let model = task.model_name.clone();
    match state.queue.enqueue(task) {
        Ok(task_id) => {
            info!(task_id = %task_id, model = %model, "Task queued");
            (StatusCode::OK, Json(TaskAccepted { message: TASK_QUEUED.to_string(), task_id }))
                .into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: e.to_string() }))
            .into_response(),
    }
}

/// Current model, idle ages, queue depth and dispatcher counters
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = StatusResponse {
        lifecycle: state.lifecycle.snapshot(),
        queue: state.queue.metrics(),
        dispatcher: state.stats.snapshot(),
    };
    (StatusCode::OK, Json(response))
}
