use std::io::{self, Write};

use gantry_core::ports::{LaunchStatus, Progress, StatusBroadcaster};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    title_id: &'a str,
    runner: &'a str,
    status: LaunchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'a Progress>,
}

/// Prints one JSON line per status change on stdout for front ends to follow.
pub struct StdoutStatus;

impl StatusBroadcaster for StdoutStatus {
    fn send_status(
        &self,
        title_id: &str,
        runner: &str,
        status: LaunchStatus,
        progress: Option<&Progress>,
    ) {
        let line = StatusLine {
            title_id,
            runner,
            status,
            progress,
        };
        if let Ok(serialized) = serde_json::to_string(&line) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{serialized}");
            let _ = stdout.flush();
        }
    }
}
