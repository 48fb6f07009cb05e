// Error types for orchestration

use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Task submission is missing required fields
    #[error("Invalid task: missing {}", .missing.join(", "))]
    InvalidTask {
        /// Names of the missing or empty fields
        missing: Vec<&'static str>,
    },

    /// The dispatcher side of the queue has gone away
    #[error("Task queue is closed")]
    QueueClosed,

    /// Dispatcher lifecycle misuse (double start, stop when idle)
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    /// Outcome record could not be persisted
    #[error("Outcome sink error: {0}")]
    Sink(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
