use std::sync::Arc;

use anyhow::Context;
use gantry_core::observability::LogLevel;
use serde_json::json;

use super::App;
use crate::infrastructure::paths::validate_title_id;
use crate::infrastructure::title_log::title_log_path;
use crate::logging::log_event;

/// Launches a title and waits for it. Ctrl-C stops the running game through
/// the abort registry instead of killing gantry.
pub async fn run_launch(app: &App, title_id: &str) -> anyhow::Result<i32> {
    let title_id = validate_title_id(title_id)?;

    let interrupt = {
        let orchestrator = Arc::clone(&app.orchestrator);
        let trace_id = app.trace_id.clone();
        let title_id = title_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log_event(
                    &trace_id,
                    LogLevel::Warn,
                    "launch",
                    "GT-CLI-030",
                    "interrupt_received",
                    json!({ "title_id": title_id }),
                );
                orchestrator.abort(&title_id);
            }
        })
    };

    let outcome = app.orchestrator.launch(title_id).await;
    interrupt.abort();

    log_event(
        &app.trace_id,
        LogLevel::Info,
        "launch",
        "GT-CLI-020",
        "launch_command_finished",
        json!({
            "title_id": title_id,
            "status": outcome.status,
            "log": title_log_path(&app.logs_dir, title_id).to_string_lossy(),
        }),
    );

    let pretty = serde_json::to_string(&json!({ "outcome": outcome }))
        .context("failed to serialize launch outcome")?;
    println!("{pretty}");

    Ok(if outcome.is_done() {
        0
    } else {
        outcome.exit_code.filter(|code| *code != 0).unwrap_or(1)
    })
}
