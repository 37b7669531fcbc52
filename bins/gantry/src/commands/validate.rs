use anyhow::Context;
use gantry_core::observability::LogLevel;
use serde_json::json;

use super::App;
use crate::infrastructure::paths::validate_title_id;
use crate::logging::log_event;

/// Prints the validation report; exit code 2 when the title cannot launch.
pub async fn run_validate(app: &App, title_id: &str) -> anyhow::Result<i32> {
    let title_id = validate_title_id(title_id)?;
    let report = app
        .orchestrator
        .validate_title(title_id)
        .await
        .with_context(|| format!("failed to load settings for '{title_id}'"))?;

    log_event(
        &app.trace_id,
        LogLevel::Info,
        "validate",
        "GT-CLI-040",
        "validate_finished",
        json!({ "title_id": title_id, "valid": report.valid }),
    );

    let pretty =
        serde_json::to_string_pretty(&report).context("failed to serialize validation report")?;
    println!("{pretty}");

    Ok(if report.valid { 0 } else { 2 })
}
