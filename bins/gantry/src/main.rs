#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod commands;
mod infrastructure;
mod logging;

use anyhow::{anyhow, Context};
use clap::Parser;
use gantry_core::observability::{new_trace_id, LogLevel};

use crate::cli::Cli;
use crate::commands::{run_in_title, run_launch, run_validate, App};
use crate::logging::log_event;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let trace_id = new_trace_id();

    if cli.selected_actions() != 1 {
        return Err(anyhow!("choose exactly one of --launch, --run or --validate"));
    }
    if !cli.command.is_empty() && cli.run.is_none() {
        return Err(anyhow!("a trailing command is only accepted with --run"));
    }

    log_event(
        &trace_id,
        LogLevel::Info,
        "startup",
        "GT-CLI-001",
        "gantry_started",
        serde_json::json!({
            "launch": cli.launch,
            "run": cli.run,
            "validate": cli.validate,
            "verbose": cli.verbose,
        }),
    );

    let app = App::build(&cli, &trace_id)
        .await
        .context("failed to set up launch context")?;

    let code = match (&cli.launch, &cli.run, &cli.validate) {
        (Some(title_id), _, _) => run_launch(&app, title_id)
            .await
            .context("launch command failed")?,
        (_, Some(title_id), _) => run_in_title(&app, title_id, &cli.command)
            .await
            .context("run command failed")?,
        (_, _, Some(title_id)) => run_validate(&app, title_id)
            .await
            .context("validate command failed")?,
        (None, None, None) => 0,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
