//! Model lifecycle management.
//!
//! Tracks which model the backend currently has resident and when each model was
//! last used. The current model and the last-used registry live behind one async
//! mutex, and backend load/unload calls are made while holding it, so an idle sweep
//! and a load can never interleave. Every change is also published to a watch
//! channel so status readers never wait on an in-flight backend call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use switchboard_abstraction::{Backend, KeepAlive};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Result of [`ModelLifecycle::ensure_loaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Whether the model is now the current model.
    pub success: bool,
    /// Time spent switching models; zero when the model was already current.
    pub switch_duration: Duration,
}

/// Mutable state guarded by the lifecycle lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct LifecycleState {
    current: Option<String>,
    last_used: HashMap<String, Instant>,
}

impl LifecycleState {
    pub(crate) fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub(crate) fn last_used(&self) -> &HashMap<String, Instant> {
        &self.last_used
    }

    /// A desynchronized state: a current model with no registry entry.
    #[cfg(test)]
    pub(crate) fn with_current_only(model: &str) -> Self {
        Self { current: Some(model.to_string()), last_used: HashMap::new() }
    }
}

/// Point-in-time view of lifecycle state, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleSnapshot {
    /// The model the backend is believed to have resident.
    pub current_model: Option<String>,
    /// Registered models and how long each has been idle, sorted by name.
    pub models: Vec<ModelEntry>,
}

/// A registry entry in a [`LifecycleSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEntry {
    /// Model identifier.
    pub name: String,
    /// Seconds since the model was last used.
    pub idle_secs: f64,
}

/// Owner of the current-model and last-used state.
pub struct ModelLifecycle {
    backend: Arc<dyn Backend>,
    keep_alive: KeepAlive,
    state: Mutex<LifecycleState>,
    published: watch::Sender<LifecycleState>,
}

impl fmt::Debug for ModelLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLifecycle")
            .field("backend", &self.backend.name())
            .field("keep_alive", &self.keep_alive)
            .field("current", &self.state.try_lock().ok().and_then(|s| s.current.clone()))
            .finish_non_exhaustive()
    }
}

impl ModelLifecycle {
    /// Creates a lifecycle manager with nothing loaded.
    ///
    /// # Arguments
    /// * `backend` - Backend that load and unload calls are issued against
    /// * `keep_alive` - Residency hint passed with every load request
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, keep_alive: KeepAlive) -> Self {
        let (published, _) = watch::channel(LifecycleState::default());
        Self { backend, keep_alive, state: Mutex::new(LifecycleState::default()), published }
    }

    fn publish(&self, state: &LifecycleState) {
        self.published.send_replace(state.clone());
    }

    /// Makes `model` the current model, loading it on the backend if needed.
    ///
    /// Returns immediately with a zero duration when `model` is already current.
    /// On a failed load the state is left unchanged and the elapsed time is still
    /// reported.
    pub async fn ensure_loaded(&self, model: &str) -> LoadOutcome {
        let mut state = self.state.lock().await;
        if state.current.as_deref() == Some(model) {
            debug!(model, "Model already loaded");
            return LoadOutcome { success: true, switch_duration: Duration::ZERO };
        }

        let started = Instant::now();
        let result = self.backend.load(model, self.keep_alive).await;
        let switch_duration = started.elapsed();

        match result {
            Ok(()) => {
                let previous = state.current.replace(model.to_string());
                state.last_used.insert(model.to_string(), Instant::now());
                self.publish(&state);
                info!(
                    model,
                    previous = ?previous,
                    duration_ms = switch_duration.as_millis() as u64,
                    "Model loaded"
                );
                LoadOutcome { success: true, switch_duration }
            }
            Err(e) => {
                warn!(
                    model,
                    error = %e,
                    duration_ms = switch_duration.as_millis() as u64,
                    "Failed to load model"
                );
                LoadOutcome { success: false, switch_duration }
            }
        }
    }

    /// Refreshes the last-used time of a registered model.
    ///
    /// # Returns
    /// `false` if the model is not registered (nothing is inserted).
    pub async fn touch(&self, model: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.last_used.get_mut(model) {
            Some(last_used) => {
                *last_used = Instant::now();
                self.publish(&state);
                true
            }
            None => false,
        }
    }

    /// Unloads `model` from the backend.
    ///
    /// On success the registry entry is removed and the current model is cleared if
    /// it matched. On failure nothing changes; the model is presumed still resident.
    pub async fn unload(&self, model: &str) -> bool {
        let mut state = self.state.lock().await;
        self.unload_locked(&mut state, model).await
    }

    /// Selects models under the lock and unloads each one without releasing it.
    ///
    /// `select` sees a consistent view of the state; failures for one model do not
    /// stop the remaining unloads.
    ///
    /// # Returns
    /// `(unloaded, failed)` model names, in selection order.
    pub(crate) async fn unload_selected<F>(&self, select: F) -> (Vec<String>, Vec<String>)
    where
        F: FnOnce(&LifecycleState) -> Vec<String> + Send,
    {
        let mut state = self.state.lock().await;
        let selected = select(&state);

        let mut unloaded = Vec::new();
        let mut failed = Vec::new();
        for model in selected {
            if self.unload_locked(&mut state, &model).await {
                unloaded.push(model);
            } else {
                failed.push(model);
            }
        }
        (unloaded, failed)
    }

    async fn unload_locked(&self, state: &mut LifecycleState, model: &str) -> bool {
        match self.backend.unload(model).await {
            Ok(()) => {
                state.last_used.remove(model);
                if state.current.as_deref() == Some(model) {
                    state.current = None;
                }
                self.publish(state);
                info!(model, "Model unloaded");
                true
            }
            Err(e) => {
                warn!(model, error = %e, "Failed to unload model; presuming it is still resident");
                false
            }
        }
    }

    /// Returns the current model, if any.
    pub async fn current_model(&self) -> Option<String> {
        self.state.lock().await.current.clone()
    }

    /// Returns whether `model` is in the registry.
    pub async fn is_registered(&self, model: &str) -> bool {
        self.state.lock().await.last_used.contains_key(model)
    }

    /// Returns the last published lifecycle state.
    ///
    /// Never waits on the lifecycle lock, so a load or unload in progress is not
    /// reflected until it completes.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.published.borrow();
        let mut models: Vec<ModelEntry> = state
            .last_used
            .iter()
            .map(|(name, last)| ModelEntry { name: name.clone(), idle_secs: last.elapsed().as_secs_f64() })
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        LifecycleSnapshot { current_model: state.current.clone(), models }
    }
}
