//! Task outcome records and the sink they are written to.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use switchboard_abstraction::GenerateResponse;

use crate::error::Result;
use crate::queue::Task;
use crate::resources::ResourceSnapshot;

/// Placeholder written in the result column when there is no backend output.
pub const NO_RESULT: &str = "N/A";

/// Result written when a generate call succeeds without any response text.
pub const NO_RESPONSE: &str = "No response received.";

/// Eval duration assumed when the backend reports none, so tokens/s stays defined.
pub const EVAL_DURATION_FALLBACK_NS: u64 = 1;

/// Column names of a persisted outcome, in order.
pub const OUTCOME_COLUMNS: [&str; 19] = [
    "timestamp",
    "task_type",
    "model_name",
    "prompt",
    "task_latency_ns",
    "model_switching_time_ns",
    "result",
    "status",
    "model_load_state",
    "total_duration_ns",
    "load_duration_ns",
    "prompt_eval_count",
    "prompt_eval_duration_ns",
    "eval_count",
    "eval_duration_ns",
    "tokens_per_second",
    "cpu_usage_percent",
    "memory_usage_percent",
    "system_load_avg",
];

/// Terminal status of a processed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    /// The backend produced a response.
    Success,
    /// The model was loaded but generation failed.
    Failed,
    /// The model could not be loaded; generation was never attempted.
    ModelLoadFailed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::ModelLoadFailed => "Model Load Failed",
        })
    }
}

/// Whether the task's model was resident when generation was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelLoadState {
    /// The model was loaded (or already current).
    Loaded,
    /// The load failed.
    Failed,
}

impl fmt::Display for ModelLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loaded => "Loaded",
            Self::Failed => "Failed",
        })
    }
}

/// Backend-reported counters, with defaults applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub total_duration_ns: u64,
    pub load_duration_ns: u64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration_ns: u64,
    pub eval_count: u64,
    pub eval_duration_ns: u64,
    pub tokens_per_second: f64,
}

impl BackendMetrics {
    /// Derives metrics from a generate response.
    ///
    /// Missing counters become 0. A missing or zero eval duration becomes
    /// [`EVAL_DURATION_FALLBACK_NS`].
    #[must_use]
    pub fn from_response(response: &GenerateResponse) -> Self {
        let eval_count = response.eval_count.unwrap_or(0);
        let eval_duration_ns = response
            .eval_duration
            .filter(|d| *d > 0)
            .unwrap_or(EVAL_DURATION_FALLBACK_NS);

        Self {
            total_duration_ns: response.total_duration.unwrap_or(0),
            load_duration_ns: response.load_duration.unwrap_or(0),
            prompt_eval_count: response.prompt_eval_count.unwrap_or(0),
            prompt_eval_duration_ns: response.prompt_eval_duration.unwrap_or(0),
            eval_count,
            eval_duration_ns,
            tokens_per_second: eval_count as f64 / eval_duration_ns as f64 * 1e9,
        }
    }
}

/// Everything recorded about one processed task. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub timestamp: DateTime<Local>,
    pub task_id: String,
    pub task_type: String,
    pub model_name: String,
    pub prompt: String,
    /// Time spent in the backend generate call; zero if it never ran.
    pub task_latency: Duration,
    pub model_switching_time: Duration,
    pub result: String,
    pub status: TaskStatus,
    pub model_load_state: ModelLoadState,
    pub metrics: BackendMetrics,
    pub resources: ResourceSnapshot,
}

impl TaskOutcome {
    /// Outcome for a task whose model could not be loaded.
    #[must_use]
    pub fn load_failed(task: &Task, switch_duration: Duration, resources: ResourceSnapshot) -> Self {
        Self::base(task, switch_duration, resources, TaskStatus::ModelLoadFailed, ModelLoadState::Failed)
    }

    /// Outcome for a task whose generate call failed.
    #[must_use]
    pub fn generate_failed(
        task: &Task,
        switch_duration: Duration,
        latency: Duration,
        resources: ResourceSnapshot,
    ) -> Self {
        Self {
            task_latency: latency,
            ..Self::base(task, switch_duration, resources, TaskStatus::Failed, ModelLoadState::Loaded)
        }
    }

    /// Outcome for a task that completed.
    #[must_use]
    pub fn succeeded(
        task: &Task,
        switch_duration: Duration,
        latency: Duration,
        response: &GenerateResponse,
        resources: ResourceSnapshot,
    ) -> Self {
        Self {
            task_latency: latency,
            result: response.response.clone().unwrap_or_else(|| NO_RESPONSE.to_string()),
            metrics: BackendMetrics::from_response(response),
            ..Self::base(task, switch_duration, resources, TaskStatus::Success, ModelLoadState::Loaded)
        }
    }

    fn base(
        task: &Task,
        switch_duration: Duration,
        resources: ResourceSnapshot,
        status: TaskStatus,
        model_load_state: ModelLoadState,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            model_name: task.model_name.clone(),
            prompt: task.prompt.clone(),
            task_latency: Duration::ZERO,
            model_switching_time: switch_duration,
            result: NO_RESULT.to_string(),
            status,
            model_load_state,
            metrics: BackendMetrics::default(),
            resources,
        }
    }

    /// Renders the outcome as one row matching [`OUTCOME_COLUMNS`].
    #[must_use]
    pub fn to_row(&self) -> [String; 19] {
        [
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.task_type.clone(),
            self.model_name.clone(),
            self.prompt.clone(),
            self.task_latency.as_nanos().to_string(),
            self.model_switching_time.as_nanos().to_string(),
            self.result.clone(),
            self.status.to_string(),
            self.model_load_state.to_string(),
            self.metrics.total_duration_ns.to_string(),
            self.metrics.load_duration_ns.to_string(),
            self.metrics.prompt_eval_count.to_string(),
            self.metrics.prompt_eval_duration_ns.to_string(),
            self.metrics.eval_count.to_string(),
            self.metrics.eval_duration_ns.to_string(),
            self.metrics.tokens_per_second.to_string(),
            self.resources.cpu_percent.to_string(),
            self.resources.memory_percent.to_string(),
            self.resources.load_average.to_string(),
        ]
    }
}

/// Destination for outcome records. One call per processed task.
pub trait OutcomeSink: Send + Sync {
    /// Persists one outcome.
    ///
    /// # Errors
    /// Returns an error if the record could not be written; the dispatcher logs it
    /// and carries on.
    fn record(&self, outcome: &TaskOutcome) -> Result<()>;
}

/// Sink that keeps outcomes in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    outcomes: Mutex<Vec<TaskOutcome>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every outcome recorded so far.
    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.outcomes.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> usize {
        self.outcomes.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutcomeSink for MemorySink {
    fn record(&self, outcome: &TaskOutcome) -> Result<()> {
        self.outcomes
            .lock()
            .map_err(|e| crate::OrchestrationError::Sink(e.to_string()))?
            .push(outcome.clone());
        Ok(())
    }
}
