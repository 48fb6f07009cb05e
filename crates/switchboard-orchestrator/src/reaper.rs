//! Idle model reaping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::lifecycle::{LifecycleState, ModelLifecycle};

/// Models acted on by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Models successfully unloaded.
    pub unloaded: Vec<String>,
    /// Models whose unload failed; they stay registered and are retried next sweep.
    pub failed: Vec<String>,
}

impl SweepReport {
    /// Whether the sweep found nothing to do.
    pub fn is_empty(&self) -> bool {
        self.unloaded.is_empty() && self.failed.is_empty()
    }
}

/// Unloads models that have been idle longer than a threshold.
#[derive(Debug, Clone)]
pub struct IdleReaper {
    lifecycle: Arc<ModelLifecycle>,
    idle_threshold: Duration,
}

impl IdleReaper {
    /// Creates a reaper over `lifecycle` using `idle_threshold` for [`IdleReaper::sweep_now`].
    #[must_use]
    pub fn new(lifecycle: Arc<ModelLifecycle>, idle_threshold: Duration) -> Self {
        Self { lifecycle, idle_threshold }
    }

    /// The configured idle threshold.
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Sweeps using the wall clock and the configured threshold.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweep(Instant::now(), self.idle_threshold).await
    }

    /// Unloads every model idle for strictly longer than `idle_threshold` at `now`.
    ///
    /// The current model is always considered, using its own registry timestamp; a
    /// current model with no timestamp counts as never used. Selection and unloads
    /// happen under a single hold of the lifecycle lock.
    pub async fn sweep(&self, now: Instant, idle_threshold: Duration) -> SweepReport {
        let (unloaded, failed) = self
            .lifecycle
            .unload_selected(|state| expired_models(state, now, idle_threshold))
            .await;

        let report = SweepReport { unloaded, failed };
        if report.is_empty() {
            debug!("Idle sweep found nothing to unload");
        } else {
            info!(
                unloaded = ?report.unloaded,
                failed = ?report.failed,
                threshold_secs = idle_threshold.as_secs_f64(),
                "Idle sweep finished"
            );
        }
        report
    }
}

fn expired_models(state: &LifecycleState, now: Instant, idle_threshold: Duration) -> Vec<String> {
    let is_expired = |last: Option<&Instant>| match last {
        Some(last) => now.saturating_duration_since(*last) > idle_threshold,
        None => true,
    };

    let mut expired: Vec<String> = state
        .last_used()
        .iter()
        .filter(|(_, last)| is_expired(Some(last)))
        .map(|(name, _)| name.clone())
        .collect();
    expired.sort();

    if let Some(current) = state.current()
        && !expired.iter().any(|m| m == current)
        && is_expired(state.last_used().get(current))
    {
        expired.push(current.to_string());
    }
    expired
}
