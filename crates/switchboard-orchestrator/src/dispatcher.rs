//! Task dispatcher.
//!
//! This module provides the single consumer of the task queue. Each iteration runs an
//! idle sweep, waits a bounded time for a task, makes sure the task's model is loaded
//! and executes it against the backend, then hands the outcome to the sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use switchboard_abstraction::Backend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestrationError, Result};
use crate::lifecycle::ModelLifecycle;
use crate::outcome::{OutcomeSink, TaskOutcome, TaskStatus};
use crate::queue::{Dequeued, Task, TaskReceiver};
use crate::reaper::IdleReaper;
use crate::resources::ResourceSampler;

/// Configuration for the task dispatcher.
#[derive(Debug, Clone)]
pub struct TaskDispatcherConfig {
    /// How long to wait for a task before running another idle sweep.
    pub poll_interval: Duration,
    /// Models idle for longer than this are unloaded. Zero unloads on the next sweep.
    pub idle_timeout: Duration,
}

impl Default for TaskDispatcherConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(1), idle_timeout: Duration::ZERO }
    }
}

/// Running totals of processed tasks.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    load_failed: AtomicU64,
}

/// Copy of [`DispatcherStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub load_failed: u64,
}

impl DispatcherStats {
    fn record(&self, status: TaskStatus) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            TaskStatus::Success => &self.succeeded,
            TaskStatus::Failed => &self.failed,
            TaskStatus::ModelLoadFailed => &self.load_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current totals.
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            load_failed: self.load_failed.load(Ordering::Relaxed),
        }
    }
}

/// Shared pieces needed to process a task. Cloned into the background loop.
#[derive(Clone)]
struct Worker {
    lifecycle: Arc<ModelLifecycle>,
    reaper: IdleReaper,
    backend: Arc<dyn Backend>,
    sampler: Arc<dyn ResourceSampler>,
    sink: Arc<dyn OutcomeSink>,
    stats: Arc<DispatcherStats>,
    poll_interval: Duration,
}

/// Result of one dispatcher iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// A task was processed to a terminal outcome.
    Processed(TaskOutcome),
    /// No task arrived within the poll interval.
    Idle,
    /// All producers are gone and the queue is drained.
    Closed,
}

impl Worker {
    /// Sweeps, then waits one poll interval for a task.
    async fn next_task(&self, receiver: &mut TaskReceiver) -> Dequeued {
        self.reaper.sweep_now().await;
        receiver.recv_timeout(self.poll_interval).await
    }

    async fn tick(&self, receiver: &mut TaskReceiver) -> Tick {
        match self.next_task(receiver).await {
            Dequeued::Task(task) => {
                let outcome = self.process(&task).await;
                receiver.mark_completed(&task.id);
                Tick::Processed(outcome)
            }
            Dequeued::Idle => Tick::Idle,
            Dequeued::Closed => Tick::Closed,
        }
    }

    async fn process(&self, task: &Task) -> TaskOutcome {
        debug!(task_id = %task.id, model = %task.model_name, task_type = %task.task_type, "Processing task");
        let before = self.sampler.sample().await;

        let load = self.lifecycle.ensure_loaded(&task.model_name).await;
        if !load.success {
            warn!(task_id = %task.id, model = %task.model_name, "Model load failed; dropping task");
            let outcome = TaskOutcome::load_failed(task, load.switch_duration, before);
            self.finish(&outcome);
            return outcome;
        }

        let prompt = task.backend_prompt();
        let started = Instant::now();
        let result = self.backend.generate(&task.model_name, &prompt).await;
        let latency = started.elapsed();
        let after = self.sampler.sample().await;
        self.lifecycle.touch(&task.model_name).await;

        let outcome = match result {
            Ok(response) => {
                info!(
                    task_id = %task.id,
                    model = %task.model_name,
                    latency_ms = latency.as_millis() as u64,
                    switch_ms = load.switch_duration.as_millis() as u64,
                    "Task completed"
                );
                TaskOutcome::succeeded(task, load.switch_duration, latency, &response, after)
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    model = %task.model_name,
                    error = %e,
                    latency_ms = latency.as_millis() as u64,
                    "Task failed"
                );
                TaskOutcome::generate_failed(task, load.switch_duration, latency, after)
            }
        };
        self.finish(&outcome);
        outcome
    }

    fn finish(&self, outcome: &TaskOutcome) {
        self.stats.record(outcome.status);
        if let Err(e) = self.sink.record(outcome) {
            error!(task_id = %outcome.task_id, error = %e, "Failed to record task outcome");
        }
    }
}

/// Task dispatcher that continuously processes the task queue.
pub struct TaskDispatcher {
    worker: Worker,
    /// Present until the background loop takes ownership of it.
    receiver: Option<TaskReceiver>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<TaskReceiver>>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("poll_interval", &self.worker.poll_interval)
            .field("idle_timeout", &self.worker.reaper.idle_threshold())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl TaskDispatcher {
    /// Creates a new task dispatcher.
    ///
    /// # Arguments
    /// * `lifecycle` - Lifecycle manager shared with anything that inspects model state
    /// * `backend` - Backend used for generate calls
    /// * `receiver` - Consumer end of the task queue
    /// * `sampler` - Resource sampler for before/after snapshots
    /// * `sink` - Destination for outcome records
    /// * `config` - Dispatcher configuration
    #[must_use]
    pub fn new(
        lifecycle: Arc<ModelLifecycle>,
        backend: Arc<dyn Backend>,
        receiver: TaskReceiver,
        sampler: Arc<dyn ResourceSampler>,
        sink: Arc<dyn OutcomeSink>,
        config: TaskDispatcherConfig,
    ) -> Self {
        let reaper = IdleReaper::new(Arc::clone(&lifecycle), config.idle_timeout);
        Self {
            worker: Worker {
                lifecycle,
                reaper,
                backend,
                sampler,
                sink,
                stats: Arc::new(DispatcherStats::default()),
                poll_interval: config.poll_interval,
            },
            receiver: Some(receiver),
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Runs one iteration in the caller's task: sweep, wait, process at most one task.
    ///
    /// # Errors
    /// Returns an error if the dispatcher is running in the background.
    pub async fn run_once(&mut self) -> Result<Tick> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| OrchestrationError::Dispatcher("Task dispatcher is running".to_string()))?;
        Ok(self.worker.tick(receiver).await)
    }

    /// Starts the dispatcher in a background task.
    ///
    /// # Errors
    /// Returns an error if the dispatcher is already running.
    pub fn start(&mut self) -> Result<()> {
        let Some(mut receiver) = self.receiver.take() else {
            return Err(OrchestrationError::Dispatcher(
                "Task dispatcher is already running".to_string(),
            ));
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        let worker = self.worker.clone();

        self.handle = Some(tokio::spawn(async move {
            info!(
                poll_interval_ms = worker.poll_interval.as_millis() as u64,
                idle_timeout_secs = worker.reaper.idle_threshold().as_secs_f64(),
                "Task dispatcher started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                // Only the wait for work is interruptible; a sweep or a task in
                // progress always runs to completion.
                worker.reaper.sweep_now().await;
                let next = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    next = receiver.recv_timeout(worker.poll_interval) => next,
                };

                match next {
                    Dequeued::Task(task) => {
                        worker.process(&task).await;
                        receiver.mark_completed(&task.id);
                    }
                    Dequeued::Idle => {}
                    Dequeued::Closed => {
                        info!("Task queue closed, dispatcher exiting");
                        break;
                    }
                }
            }

            info!("Task dispatcher stopped");
            receiver
        }));

        Ok(())
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// A task that is being processed runs to completion first. Afterwards the
    /// dispatcher can be started again or driven with [`TaskDispatcher::run_once`].
    ///
    /// # Errors
    /// Returns an error if the dispatcher is not running.
    pub async fn stop(&mut self) -> Result<()> {
        let (Some(shutdown_tx), Some(handle)) = (self.shutdown_tx.take(), self.handle.take()) else {
            return Err(OrchestrationError::Dispatcher("Task dispatcher is not running".to_string()));
        };
        let _ = shutdown_tx.send(true);
        let receiver = handle
            .await
            .map_err(|e| OrchestrationError::Dispatcher(format!("Dispatcher task panicked: {}", e)))?;
        self.receiver = Some(receiver);
        Ok(())
    }

    /// Checks if the dispatcher loop is running in the background.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Gets the running totals.
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.worker.stats)
    }

    /// Gets the lifecycle manager.
    pub fn lifecycle(&self) -> Arc<ModelLifecycle> {
        Arc::clone(&self.worker.lifecycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::MemorySink;
    use crate::queue::{self, TaskQueue};
    use crate::resources::StaticSampler;
    use switchboard_abstraction::KeepAlive;
    use switchboard_models::MockBackend;

    struct Harness {
        backend: Arc<MockBackend>,
        sink: Arc<MemorySink>,
        queue: TaskQueue,
        dispatcher: TaskDispatcher,
    }

    fn harness(idle_timeout: Duration) -> Harness {
        let backend = Arc::new(MockBackend::new());
        let sink = Arc::new(MemorySink::new());
        let lifecycle = Arc::new(ModelLifecycle::new(backend.clone(), KeepAlive::Forever));
        let (queue, receiver) = queue::channel();
        let dispatcher = TaskDispatcher::new(
            lifecycle,
            backend.clone(),
            receiver,
            Arc::new(StaticSampler::default()),
            sink.clone(),
            TaskDispatcherConfig { poll_interval: Duration::from_millis(10), idle_timeout },
        );
        Harness { backend, sink, queue, dispatcher }
    }

    fn task(model: &str) -> Task {
        Task::try_new("arithmetic", model, "2+2").unwrap()
    }

    #[tokio::test]
    async fn test_run_once_idle() {
        let mut h = harness(Duration::from_secs(60));
        assert_eq!(h.dispatcher.run_once().await.unwrap(), Tick::Idle);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_processes_task() {
        let mut h = harness(Duration::from_secs(60));
        h.queue.enqueue(task("M1")).unwrap();

        let Tick::Processed(outcome) = h.dispatcher.run_once().await.unwrap() else {
            panic!("Expected a processed task");
        };
        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(h.sink.len(), 1);
        assert_eq!(h.dispatcher.stats().snapshot().succeeded, 1);
        assert_eq!(h.queue.metrics().completed, 1);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let mut h = harness(Duration::from_secs(60));
        h.dispatcher.start().unwrap();
        assert!(h.dispatcher.is_running());
        assert!(h.dispatcher.run_once().await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        h.dispatcher.stop().await.unwrap();
        assert!(!h.dispatcher.is_running());

        // The receiver is handed back, so the dispatcher can be driven manually again.
        assert_eq!(h.dispatcher.run_once().await.unwrap(), Tick::Idle);
    }

    #[tokio::test]
    async fn test_double_start() {
        let mut h = harness(Duration::from_secs(60));
        h.dispatcher.start().unwrap();

        let result = h.dispatcher.start();
        assert!(matches!(result, Err(OrchestrationError::Dispatcher(_))));

        h.dispatcher.stop().await.unwrap();
        assert!(h.dispatcher.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_background_loop_processes_tasks() {
        let mut h = harness(Duration::from_secs(60));
        h.dispatcher.start().unwrap();

        for _ in 0..3 {
            h.queue.enqueue(task("M1")).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.dispatcher.stop().await.unwrap();

        assert_eq!(h.sink.len(), 3);
        assert_eq!(h.backend.load_count("M1"), 1);
        assert_eq!(h.queue.metrics().pending, 0);
    }

    #[tokio::test]
    async fn test_loop_exits_when_queue_closed() {
        let Harness { mut dispatcher, queue, .. } = harness(Duration::from_secs(60));
        dispatcher.start().unwrap();
        drop(queue);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dispatcher.is_running());
    }
}
