//! Backend implementations for Switchboard.
//!
//! This crate provides concrete implementations of the `Backend` trait.
//!
//! # Supported Backends
//!
//! - **Mock**: Scripted in-process backend for testing and development
//! - **Ollama**: Local models via Ollama (no API key, local execution)

pub mod ollama;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_abstraction::{Backend, BackendError, GenerateResponse, KeepAlive};
use tracing::debug;

pub use ollama::OllamaBackend;

/// Calls observed by a [`MockBackend`], in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// A load request for the given model.
    Load(String),
    /// An unload request for the given model.
    Unload(String),
    /// A generate request for the given model and prompt.
    Generate(String, String),
}

/// A scripted implementation of the `Backend` trait for testing and demonstration.
///
/// Every call is recorded. Individual models can be made to fail on load, unload
/// or generate, and load or generate can be slowed down to widen race windows in tests.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<MockCall>>,
    failing_loads: Mutex<HashSet<String>>,
    failing_unloads: Mutex<HashSet<String>>,
    failing_generates: Mutex<HashSet<String>>,
    response: Mutex<GenerateResponse>,
    generate_delay: Mutex<Option<Duration>>,
    load_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    /// Creates a mock that succeeds on every call and answers generate with a
    /// fixed set of counters.
    #[must_use]
    pub fn new() -> Self {
        let backend = Self::default();
        backend.set_response(GenerateResponse {
            response: Some("mock response".to_string()),
            total_duration: Some(5_000_000),
            load_duration: Some(1_000_000),
            prompt_eval_count: Some(8),
            prompt_eval_duration: Some(1_000_000),
            eval_count: Some(20),
            eval_duration: Some(2_000_000),
        });
        backend
    }

    /// Makes every load of `model` fail.
    pub fn fail_load(&self, model: &str) {
        lock(&self.failing_loads).insert(model.to_string());
    }

    /// Makes every unload of `model` fail.
    pub fn fail_unload(&self, model: &str) {
        lock(&self.failing_unloads).insert(model.to_string());
    }

    /// Lets unloads of `model` succeed again.
    pub fn allow_unload(&self, model: &str) {
        lock(&self.failing_unloads).remove(model);
    }

    /// Makes every generate against `model` fail.
    pub fn fail_generate(&self, model: &str) {
        lock(&self.failing_generates).insert(model.to_string());
    }

    /// Replaces the response returned by successful generate calls.
    pub fn set_response(&self, response: GenerateResponse) {
        *lock(&self.response) = response;
    }

    /// Delays every generate call by `delay`.
    pub fn set_generate_delay(&self, delay: Duration) {
        *lock(&self.generate_delay) = Some(delay);
    }

    /// Delays every load call by `delay`.
    pub fn set_load_delay(&self, delay: Duration) {
        *lock(&self.load_delay) = Some(delay);
    }

    /// Returns every call recorded so far.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of load calls issued for `model`.
    pub fn load_count(&self, model: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Load(m) if m == model))
    }

    /// Number of unload calls issued for `model`.
    pub fn unload_count(&self, model: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Unload(m) if m == model))
    }

    /// Number of generate calls issued for any model.
    pub fn generate_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Generate(..)))
    }

    /// Highest number of generate calls observed running at the same time.
    pub fn max_concurrent_generates(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Backend for MockBackend {
    async fn load(&self, model: &str, keep_alive: KeepAlive) -> Result<(), BackendError> {
        debug!(model, keep_alive = ?keep_alive, "MockBackend loading model");
        self.record(MockCall::Load(model.to_string()));
        let delay = *lock(&self.load_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failing_loads).contains(model) {
            return Err(BackendError::ModelNotFound(model.to_string()));
        }
        Ok(())
    }

    async fn unload(&self, model: &str) -> Result<(), BackendError> {
        debug!(model, "MockBackend unloading model");
        self.record(MockCall::Unload(model.to_string()));
        if lock(&self.failing_unloads).contains(model) {
            return Err(BackendError::Status { status: 500, message: "unload rejected".to_string() });
        }
        Ok(())
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<GenerateResponse, BackendError> {
        debug!(model, prompt = %prompt, "MockBackend generating text");
        self.record(MockCall::Generate(model.to_string(), prompt.to_string()));

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *lock(&self.generate_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if lock(&self.failing_generates).contains(model) {
            return Err(BackendError::Status { status: 500, message: "generation failed".to_string() });
        }
        Ok(lock(&self.response).clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
