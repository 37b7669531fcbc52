use std::io::{self, Write};

use anyhow::{anyhow, Context};

use super::App;
use crate::infrastructure::paths::validate_title_id;

/// Runs `argv` inside the title's runtime and relays its output.
pub async fn run_in_title(app: &App, title_id: &str, argv: &[String]) -> anyhow::Result<i32> {
    let title_id = validate_title_id(title_id)?;
    if argv.is_empty() {
        return Err(anyhow!("--run needs a command after `--`"));
    }

    let output = app
        .orchestrator
        .run_command_for_title(title_id, argv.to_vec())
        .await
        .with_context(|| format!("failed to run command for '{title_id}'"))?;

    io::stdout()
        .write_all(output.stdout.as_bytes())
        .context("failed to relay stdout")?;
    io::stderr()
        .write_all(output.stderr.as_bytes())
        .context("failed to relay stderr")?;

    if let Some(failure) = &output.failure {
        eprintln!("gantry: {failure}");
    }

    Ok(match (output.success, output.exit_code) {
        (true, _) => 0,
        (false, Some(code)) if code != 0 => code,
        (false, _) => 1,
    })
}
