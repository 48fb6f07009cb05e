//! Switchboard Server - Entry Point
//!
//! This binary starts the task intake and the dispatcher.

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use switchboard_core::config::{Config, ConfigOverrides};
use switchboard_core::telemetry;

#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about = "Single-model task dispatcher for Ollama")]
struct Args {
    /// Path to a TOML config file (defaults to ./switchboard.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the HTTP intake
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds a model may stay idle before it is unloaded
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let overrides = ConfigOverrides { port: args.port, idle_timeout_secs: args.idle_timeout_secs };

    // Load configuration
    let config = match Config::load(args.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    telemetry::init(&config.logging);

    // Start server
    if let Err(e) = switchboard_core::run(config).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
