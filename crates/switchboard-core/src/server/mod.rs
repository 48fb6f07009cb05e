//! HTTP intake server
//!
//! Accepts task submissions and exposes health and status endpoints.

mod handlers;
mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;

pub use handlers::{AppState, MISSING_FIELDS, TASK_QUEUED};
pub use routes::api_routes;

/// Build the application with middleware attached
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the intake until `shutdown` resolves
pub async fn serve<F>(state: Arc<AppState>, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server listening on http://{}", addr);
    info!("  POST /perform_task - Submit a task");
    info!("  GET  /status - Lifecycle and queue status");
    info!("  GET  /health - Health check");

    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
