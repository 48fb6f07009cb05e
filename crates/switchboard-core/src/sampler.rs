//! Host resource sampling via `sysinfo`.

use async_trait::async_trait;
use switchboard_orchestrator::{ResourceSampler, ResourceSnapshot};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

/// Samples global CPU, memory and load average from the host.
///
/// CPU usage is a delta between two refreshes, so each sample waits
/// [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] between them.
pub struct SystemSampler {
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSampler").finish_non_exhaustive()
    }
}

impl SystemSampler {
    /// Create a sampler primed with an initial CPU and memory reading.
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage())
                .with_memory(MemoryRefreshKind::new().with_ram()),
        );
        Self { system: Mutex::new(system) }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSampler for SystemSampler {
    async fn sample(&self) -> ResourceSnapshot {
        let mut sys = self.system.lock().await;
        sys.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu = f64::from(sys.global_cpu_info().cpu_usage());
        let total = sys.total_memory();
        let memory = if total == 0 { 0.0 } else { sys.used_memory() as f64 / total as f64 * 100.0 };
        let load = System::load_average().one;

        ResourceSnapshot::sanitized(cpu, memory, load)
    }
}
