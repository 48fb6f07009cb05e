//! Inference task queue.
//!
//! Multi-producer, single-consumer FIFO. Producers hold a cloneable [`TaskQueue`];
//! the dispatcher owns the only [`TaskReceiver`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{OrchestrationError, Result};

/// An inference request waiting to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Identifier handed back to the submitter and used in logs.
    pub id: String,
    /// Kind of work, folded into the prompt (e.g. "arithmetic").
    pub task_type: String,
    /// Backend model that must be resident to run the task.
    pub model_name: String,
    /// User prompt text.
    pub prompt: String,
    /// When the task was created.
    pub enqueued_at: Instant,
}

impl Task {
    /// Creates a task after checking that no field is empty.
    ///
    /// # Errors
    /// Returns `OrchestrationError::InvalidTask` listing every missing field.
    pub fn try_new(
        task_type: impl Into<String>,
        model_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<Self> {
        let task_type = task_type.into();
        let model_name = model_name.into();
        let prompt = prompt.into();

        let missing: Vec<&'static str> = [
            ("task_type", &task_type),
            ("model_name", &model_name),
            ("prompt", &prompt),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(OrchestrationError::InvalidTask { missing });
        }

        Ok(Self {
            id: format!("task-{}", uuid::Uuid::new_v4()),
            task_type,
            model_name,
            prompt,
            enqueued_at: Instant::now(),
        })
    }

    /// Builds the text sent to the backend for this task.
    #[must_use]
    pub fn backend_prompt(&self) -> String {
        format!("Perform {} on: {}", self.task_type, self.prompt)
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicUsize,
    dequeued: AtomicUsize,
    completed: AtomicUsize,
}

/// Producer handle for the task queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
    counters: Arc<QueueCounters>,
}

/// Consumer handle for the task queue. There is exactly one per queue.
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<Task>,
    counters: Arc<QueueCounters>,
}

/// Result of waiting on the queue for a bounded time.
#[derive(Debug)]
pub enum Dequeued {
    /// A task was available.
    Task(Task),
    /// Nothing arrived within the wait interval.
    Idle,
    /// Every producer has been dropped and the queue is drained.
    Closed,
}

/// Creates a connected producer/consumer pair.
#[must_use]
pub fn channel() -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let counters = Arc::new(QueueCounters::default());
    (
        TaskQueue { sender, counters: Arc::clone(&counters) },
        TaskReceiver { receiver, counters },
    )
}

impl TaskQueue {
    /// Enqueues a task at the back of the queue.
    ///
    /// # Returns
    /// The task id, for the submission receipt.
    ///
    /// # Errors
    /// Returns `OrchestrationError::QueueClosed` if the receiver has been dropped.
    pub fn enqueue(&self, task: Task) -> Result<String> {
        let task_id = task.id.clone();
        debug!(task_id = %task_id, model = %task.model_name, task_type = %task.task_type, "Enqueueing task");
        // Count before sending so the consumer never observes more dequeues than enqueues.
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.counters.enqueued.fetch_sub(1, Ordering::SeqCst);
            return Err(OrchestrationError::QueueClosed);
        }
        Ok(task_id)
    }

    /// Returns queue metrics.
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics::from_counters(&self.counters)
    }
}

impl TaskReceiver {
    /// Waits up to `wait` for the next task.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Dequeued {
        match tokio::time::timeout(wait, self.receiver.recv()).await {
            Ok(Some(task)) => {
                self.counters.dequeued.fetch_add(1, Ordering::SeqCst);
                debug!(
                    task_id = %task.id,
                    waited_ms = task.enqueued_at.elapsed().as_millis() as u64,
                    "Dequeued task"
                );
                Dequeued::Task(task)
            }
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::Idle,
        }
    }

    /// Takes the next task if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<Task> {
        let task = self.receiver.try_recv().ok()?;
        self.counters.dequeued.fetch_add(1, Ordering::SeqCst);
        Some(task)
    }

    /// Marks a dequeued task as fully resolved.
    pub fn mark_completed(&self, task_id: &str) {
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
        debug!(task_id = %task_id, "Task completed");
    }

    /// Returns queue metrics.
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics::from_counters(&self.counters)
    }
}

/// Queue metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    /// Number of tasks waiting to be dequeued.
    pub pending: usize,
    /// Number of tasks dequeued but not yet resolved (0 or 1).
    pub running: usize,
    /// Number of tasks fully resolved.
    pub completed: usize,
}

impl QueueMetrics {
    fn from_counters(counters: &QueueCounters) -> Self {
        let enqueued = counters.enqueued.load(Ordering::SeqCst);
        let dequeued = counters.dequeued.load(Ordering::SeqCst);
        let completed = counters.completed.load(Ordering::SeqCst);
        Self {
            pending: enqueued.saturating_sub(dequeued),
            running: dequeued.saturating_sub(completed),
            completed,
        }
    }
}
