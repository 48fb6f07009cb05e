//! Replay command implementation.
//!
//! Posts a JSON array of tasks one by one with a fixed delay between them. Useful
//! for driving the dispatcher with a realistic arrival pattern.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use crate::client::{SubmitResponse, SwitchboardClient, TaskSubmission};

/// Totals for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Read a task file: a JSON array of `{task_type, model_name, prompt}` objects.
pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<TaskSubmission>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid task file {}", path.display()))
}

/// Execute the replay command.
///
/// A rejected task is reported and skipped. Transport errors abort the run.
pub async fn execute(client: &SwitchboardClient, path: &Path, delay: Duration) -> anyhow::Result<ReplaySummary> {
    let tasks = load_tasks(path)?;
    let total = tasks.len();
    let mut summary = ReplaySummary::default();

    for (i, task) in tasks.iter().enumerate() {
        println!("Submitting task {}/{}: {} on {}", i + 1, total, task.task_type, task.model_name);
        match client.submit(task).await? {
            SubmitResponse::Accepted(task_id) => {
                summary.accepted += 1;
                println!("  {} {}", "queued".green(), task_id);
            }
            SubmitResponse::Rejected { status, error } => {
                summary.rejected += 1;
                println!("  {} ({}): {}", "rejected".red(), status, error);
            }
        }

        if i + 1 < total && !delay.is_zero() {
            debug!(delay_secs = delay.as_secs_f64(), "Waiting before next submission");
            tokio::time::sleep(delay).await;
        }
    }

    println!(
        "{} {} accepted, {} rejected",
        "Done:".bold(),
        summary.accepted,
        summary.rejected
    );
    Ok(summary)
}
