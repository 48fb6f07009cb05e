//! Backend abstraction layer for Switchboard.
//!
//! This module defines the contract between the dispatcher and a model-serving
//! backend: load a model into memory, unload it, and run a generation against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when talking to a model-serving backend.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The backend could not be reached (connection refused, DNS, timeout).
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned status {status}: {message}")]
    Status {
        /// HTTP (or equivalent) status code.
        status: u16,
        /// Error text reported by the backend.
        message: String,
    },

    /// The requested model is unknown to the backend.
    #[error("Model '{0}' not found on backend")]
    ModelNotFound(String),

    /// The backend response could not be decoded.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// Other unexpected errors.
    #[error("Other Backend Error: {0}")]
    Other(String),
}

/// How long the backend should keep a model resident after a load request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeepAlive {
    /// Keep the model resident until it is explicitly unloaded.
    #[default]
    Forever,
    /// Keep the model resident for the given number of seconds.
    Seconds(u64),
}

impl KeepAlive {
    /// Builds a keep-alive hint from a signed seconds value, where any negative
    /// number means "forever".
    #[must_use]
    pub fn from_secs(secs: i64) -> Self {
        u64::try_from(secs).map_or(Self::Forever, Self::Seconds)
    }
}

/// The response from a generate call.
///
/// Counters are optional because backends omit fields they did not measure;
/// consumers decide which default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text, if the backend returned any.
    #[serde(default)]
    pub response: Option<String>,

    /// Total time spent by the backend on the request, in nanoseconds.
    #[serde(default)]
    pub total_duration: Option<u64>,

    /// Time spent loading the model, in nanoseconds.
    #[serde(default)]
    pub load_duration: Option<u64>,

    /// Number of tokens in the prompt.
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,

    /// Time spent evaluating the prompt, in nanoseconds.
    #[serde(default)]
    pub prompt_eval_duration: Option<u64>,

    /// Number of tokens generated.
    #[serde(default)]
    pub eval_count: Option<u64>,

    /// Time spent generating tokens, in nanoseconds.
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

/// A model-serving backend.
///
/// All backends must be `Send + Sync` so a single instance can be shared by
/// the lifecycle manager and the dispatcher.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Makes `model` resident, keeping it loaded according to `keep_alive`.
    ///
    /// # Errors
    /// Returns a `BackendError` if the backend rejects the load or is unreachable.
    async fn load(&self, model: &str, keep_alive: KeepAlive) -> Result<(), BackendError>;

    /// Evicts `model` from backend memory.
    ///
    /// # Errors
    /// Returns a `BackendError` if the backend rejects the unload or is unreachable.
    async fn unload(&self, model: &str) -> Result<(), BackendError>;

    /// Runs a single non-streaming generation.
    ///
    /// # Errors
    /// Returns a `BackendError` if generation fails.
    async fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse, BackendError>;

    /// Returns a short name for the backend, used in logs.
    fn name(&self) -> &str;
}
