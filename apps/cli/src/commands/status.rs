//! Status command implementation.

use colored::Colorize;
use serde_json::Value;

use crate::client::SwitchboardClient;

/// Execute the status command.
///
/// Shows the current model, idle ages, queue depth and dispatcher counters.
pub async fn execute(client: &SwitchboardClient, json_output: bool) -> anyhow::Result<()> {
    let status = client.status().await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Switchboard Status".bold().cyan());
    println!();

    let current = status["current_model"].as_str().unwrap_or("none");
    println!("{} {}", "Current model:".bold(), current.green());

    println!("{}", "Registered models:".bold());
    match status["models"].as_array() {
        Some(models) if !models.is_empty() => {
            for model in models {
                let name = model["name"].as_str().unwrap_or("?");
                let idle = model["idle_secs"].as_f64().unwrap_or(0.0);
                println!("  {} (idle {:.1}s)", name, idle);
            }
        }
        _ => println!("  {}", "none".dimmed()),
    }
    println!();

    println!("{}", "Queue:".bold());
    for key in ["pending", "running", "completed"] {
        println!("  {}: {}", key, count(&status["queue"], key));
    }

    println!("{}", "Dispatcher:".bold());
    for key in ["processed", "succeeded", "failed", "load_failed"] {
        println!("  {}: {}", key, count(&status["dispatcher"], key));
    }
    Ok(())
}

fn count(section: &Value, key: &str) -> u64 {
    section[key].as_u64().unwrap_or(0)
}
