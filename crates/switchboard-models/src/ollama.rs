//! Ollama backend implementation.
//!
//! This module provides an implementation of the `Backend` trait for Ollama's local API.
//! Ollama has no dedicated load/unload endpoints; residency is controlled through the
//! `keep_alive` field of otherwise empty chat and generate requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_abstraction::{Backend, BackendError, GenerateResponse, KeepAlive};
use tracing::{debug, error};

/// Default Ollama server URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama backend implementation.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    /// The base URL for the Ollama API (default: "http://localhost:11434").
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OllamaBackend {
    /// Creates a new `OllamaBackend` against the default local server.
    ///
    /// # Errors
    /// Returns a `BackendError` if the HTTP client cannot be created.
    pub fn new() -> Result<Self, BackendError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), None)
    }

    /// Creates a new `OllamaBackend` with a custom base URL.
    ///
    /// # Arguments
    /// * `base_url` - The base URL for the Ollama API (e.g., "http://192.168.1.100:11434")
    /// * `timeout` - Optional per-request timeout
    ///
    /// # Errors
    /// Returns a `BackendError` if the HTTP client cannot be created.
    pub fn with_base_url(base_url: String, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    /// Returns the base URL this backend talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// Ollama API request/response structures
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Body used for both load (`keep_alive` > 0 or -1) and unload (`keep_alive` = 0).
#[derive(Serialize)]
struct OllamaKeepAliveRequest<'a> {
    model: &'a str,
    keep_alive: Value,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaBackend {
    fn keep_alive_value(keep_alive: KeepAlive) -> Value {
        match keep_alive {
            KeepAlive::Forever => Value::from(-1),
            KeepAlive::Seconds(secs) => Value::from(secs),
        }
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            error!(error = %e, base_url = %self.base_url, "Failed to connect to Ollama");
            if e.is_connect() {
                BackendError::Unreachable(format!(
                    "Ollama server not reachable at {}. Start it with 'ollama serve'.",
                    self.base_url
                ))
            } else if e.is_timeout() {
                BackendError::Unreachable(format!("Request to {} timed out", url))
            } else {
                BackendError::Unreachable(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(status = %status, error = %error_text, path, "Ollama API returned error status");
        Err(Self::classify_error(status.as_u16(), &error_text, body_model(body)))
    }

    /// Maps an error response to a `BackendError`, recognising Ollama's common messages.
    fn classify_error(status: u16, error_text: &str, model: Option<String>) -> BackendError {
        let message = serde_json::from_str::<OllamaError>(error_text)
            .map_or_else(|_| error_text.to_string(), |e| e.error);

        if let Some(model) = model
            && (status == 404 || (message.contains("model") && message.contains("not found")))
        {
            return BackendError::ModelNotFound(model);
        }
        if message.contains("out of memory") || message.contains("OOM") {
            return BackendError::Status {
                status,
                message: "Insufficient memory to load model. Try a smaller variant.".to_string(),
            };
        }
        BackendError::Status { status, message }
    }
}

/// Pulls the `model` field back out of a serialized request body for error reporting.
fn body_model<T: Serialize>(body: &T) -> Option<String> {
    serde_json::to_value(body)
        .ok()
        .and_then(|v| v.get("model").and_then(Value::as_str).map(str::to_string))
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn load(&self, model: &str, keep_alive: KeepAlive) -> Result<(), BackendError> {
        debug!(model, keep_alive = ?keep_alive, "Loading model on Ollama");
        let body = OllamaKeepAliveRequest { model, keep_alive: Self::keep_alive_value(keep_alive) };
        self.post("/api/chat", &body).await.map(|_| ())
    }

    async fn unload(&self, model: &str) -> Result<(), BackendError> {
        debug!(model, "Unloading model on Ollama");
        let body = OllamaKeepAliveRequest { model, keep_alive: Value::from(0) };
        self.post("/api/generate", &body).await.map(|_| ())
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse, BackendError> {
        debug!(model, prompt_len = prompt.len(), "Ollama generating text");
        let body = OllamaGenerateRequest { model, prompt, stream: false };
        let response = self.post("/api/generate", &body).await?;

        response.json::<GenerateResponse>().await.map_err(|e| {
            error!(error = %e, "Failed to parse Ollama API response");
            BackendError::SerializationError(format!("Failed to parse response: {}", e))
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
