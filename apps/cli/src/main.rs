//! Switchboard CLI - Command-line client for the Switchboard task intake
//!
//! This CLI provides an `sbctl` command for submitting tasks, replaying a task
//! file against a running server, and inspecting dispatcher status.

mod client;
mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use client::{DEFAULT_SERVER, SwitchboardClient, TaskSubmission};
use commands::{replay, status, submit};

/// Switchboard CLI - submit and inspect dispatcher tasks
#[derive(Parser, Debug)]
#[command(name = "sbctl", author, version, about = "Client for the Switchboard task dispatcher")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Server base URL
    #[arg(short, long, env = "SWITCHBOARD_URL", default_value = DEFAULT_SERVER, global = true)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a single task
    Submit {
        /// Kind of work, e.g. "arithmetic" or "summarize"
        #[arg(short, long)]
        task_type: String,

        /// Model to run the task on
        #[arg(short, long)]
        model: String,

        /// Prompt text
        prompt: String,
    },

    /// Submit every task in a JSON file, pausing between submissions
    Replay {
        /// JSON array of {task_type, model_name, prompt}
        file: PathBuf,

        /// Seconds to wait between submissions
        #[arg(short, long, default_value_t = 10.0)]
        delay_secs: f64,
    },

    /// Show current model, queue and dispatcher counters
    Status {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client = SwitchboardClient::new(&args.server)?;

    match args.command {
        Command::Submit { task_type, model, prompt } => {
            submit::execute(&client, TaskSubmission { task_type, model_name: model, prompt }).await
        }
        Command::Replay { file, delay_secs } => {
            let delay = Duration::try_from_secs_f64(delay_secs)
                .map_err(|e| anyhow::anyhow!("Invalid delay {}: {}", delay_secs, e))?;
            let summary = replay::execute(&client, &file, delay).await?;
            if summary.accepted == 0 && summary.rejected > 0 {
                anyhow::bail!("No tasks were accepted");
            }
            Ok(())
        }
        Command::Status { json } => status::execute(&client, json).await,
    }
}
