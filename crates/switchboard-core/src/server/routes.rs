//! Route definitions

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{AppState, health, perform_task, status};

/// Create the intake router
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/perform_task", post(perform_task))
        .route("/health", get(health))
        .route("/status", get(status))
}
