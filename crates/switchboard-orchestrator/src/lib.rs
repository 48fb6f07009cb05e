//! Task dispatch and model lifecycle management for Switchboard.
//!
//! A single dispatcher drains a FIFO task queue. Before each task it asks the
//! [`ModelLifecycle`] to make the task's model resident, then runs the task on the
//! backend and records a [`TaskOutcome`]. An [`IdleReaper`] sweep at the top of every
//! dispatcher iteration unloads models that have been idle past a threshold, under
//! the same lock the lifecycle uses for loads.

pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod queue;
pub mod reaper;
pub mod resources;

pub use dispatcher::{DispatcherStats, DispatcherStatsSnapshot, TaskDispatcher, TaskDispatcherConfig, Tick};
pub use error::{OrchestrationError, Result};
pub use lifecycle::{LifecycleSnapshot, LoadOutcome, ModelEntry, ModelLifecycle};
pub use outcome::{
    BackendMetrics, MemorySink, ModelLoadState, OUTCOME_COLUMNS, OutcomeSink, TaskOutcome, TaskStatus,
};
pub use queue::{Dequeued, QueueMetrics, Task, TaskQueue, TaskReceiver, channel};
pub use reaper::{IdleReaper, SweepReport};
pub use resources::{ResourceSampler, ResourceSnapshot, StaticSampler};
