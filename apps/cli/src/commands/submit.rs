//! Submit command implementation.

use colored::Colorize;

use crate::client::{SubmitResponse, SwitchboardClient, TaskSubmission};

/// Execute the submit command.
pub async fn execute(client: &SwitchboardClient, task: TaskSubmission) -> anyhow::Result<()> {
    match client.submit(&task).await? {
        SubmitResponse::Accepted(task_id) => {
            println!("{} {}", "Queued".green(), task_id);
            Ok(())
        }
        SubmitResponse::Rejected { status, error } => {
            anyhow::bail!("Submission rejected ({}): {}", status, error)
        }
    }
}
