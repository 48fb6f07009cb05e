//! System resource sampling interface.

use async_trait::async_trait;
use serde::Serialize;

/// Point-in-time system load figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Global CPU usage, 0-100.
    pub cpu_percent: f64,
    /// Used memory as a percentage of total, 0-100.
    pub memory_percent: f64,
    /// One-minute load average.
    pub load_average: f64,
}

impl ResourceSnapshot {
    /// Builds a snapshot, replacing anything a sampler could not measure with 0.
    ///
    /// CPU and memory are clamped to `[0, 100]`; non-finite or negative values become 0.
    #[must_use]
    pub fn sanitized(cpu_percent: f64, memory_percent: f64, load_average: f64) -> Self {
        Self {
            cpu_percent: clamp_percent(cpu_percent),
            memory_percent: clamp_percent(memory_percent),
            load_average: if load_average.is_finite() && load_average >= 0.0 { load_average } else { 0.0 },
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 }
}

/// Source of [`ResourceSnapshot`]s. Implementations absorb their own failures.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Takes a snapshot. Never fails; unmeasurable figures are reported as 0.
    async fn sample(&self) -> ResourceSnapshot;
}

/// Sampler that always returns the same snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSampler(pub ResourceSnapshot);

#[async_trait]
impl ResourceSampler for StaticSampler {
    async fn sample(&self) -> ResourceSnapshot {
        self.0
    }
}
