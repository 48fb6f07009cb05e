//! Error types for the Switchboard server.

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A layer could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for the server.
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dispatcher and sink errors
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] switchboard_orchestrator::OrchestrationError),

    /// Backend client construction errors
    #[error("Backend error: {0}")]
    Backend(#[from] switchboard_abstraction::BackendError),

    /// Address parsing errors
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, SwitchboardError>;
