//! Switchboard server: HTTP intake in front of a single-consumer task dispatcher.
//!
//! This crate wires the pieces together:
//! - Layered configuration
//! - The axum intake server (`/perform_task`, `/status`, `/health`)
//! - The CSV outcome log and the host resource sampler
//!
//! # Example
//!
//! ```rust,no_run
//! use switchboard_core::config::{Config, ConfigOverrides};
//!
//! #[tokio::main]
//! async fn main() -> switchboard_core::error::Result<()> {
//!     let config = Config::load(None, &ConfigOverrides::default())?;
//!     switchboard_core::run(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod sampler;
pub mod server;
pub mod sink;
pub mod telemetry;

use std::sync::Arc;

use switchboard_models::OllamaBackend;
use switchboard_orchestrator::{ModelLifecycle, TaskDispatcher, channel};
use tracing::{info, warn};

pub use config::Config;
pub use error::{ConfigError, Result, SwitchboardError};
pub use sampler::SystemSampler;
pub use server::AppState;
pub use sink::CsvOutcomeSink;

/// Run the server until Ctrl-C, then stop the dispatcher between tasks.
///
/// # Errors
///
/// Returns an error if the outcome log cannot be created, the listener cannot
/// bind, or the dispatcher fails to start or stop.
pub async fn run(config: Config) -> Result<()> {
    let backend = Arc::new(OllamaBackend::with_base_url(
        config.backend.base_url.clone(),
        config.backend.request_timeout(),
    )?);
    let lifecycle = Arc::new(ModelLifecycle::new(backend.clone(), config.backend.keep_alive()));
    let sink = Arc::new(CsvOutcomeSink::create(&config.metrics.log_file)?);
    let (queue, receiver) = channel();

    let dispatcher_config = config.to_dispatcher_config();
    info!(
        backend = %config.backend.base_url,
        idle_timeout_secs = config.dispatcher.idle_timeout_secs,
        poll_interval_ms = config.dispatcher.poll_interval_ms,
        log_file = %sink.path().display(),
        "Starting dispatcher"
    );
    if dispatcher_config.idle_timeout.is_zero() {
        warn!("Idle timeout is 0: models are unloaded as soon as they are not serving a task");
    }

    let mut dispatcher = TaskDispatcher::new(
        Arc::clone(&lifecycle),
        backend,
        receiver,
        Arc::new(SystemSampler::new()),
        sink,
        dispatcher_config,
    );
    dispatcher.start()?;

    let state = Arc::new(AppState::new(queue, lifecycle, dispatcher.stats()));
    let served = server::serve(state, &config.server, shutdown_signal()).await;

    info!("Stopping dispatcher");
    dispatcher.stop().await?;
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
