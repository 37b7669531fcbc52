use gantry_core::observability::LogLevel;
use gantry_core::ports::PresencePort;
use serde_json::json;

use crate::logging::log_event;

/// Records presence changes in the event log; no chat client is attached.
pub struct LoggedPresence {
    trace_id: String,
}

impl LoggedPresence {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
        }
    }
}

impl PresencePort for LoggedPresence {
    fn set_playing(&self, title_id: &str, label: &str) {
        log_event(
            &self.trace_id,
            LogLevel::Info,
            "presence",
            "GT-PR-010",
            "presence_playing",
            json!({ "title_id": title_id, "label": label }),
        );
    }

    fn clear(&self, title_id: &str) {
        log_event(
            &self.trace_id,
            LogLevel::Info,
            "presence",
            "GT-PR-020",
            "presence_cleared",
            json!({ "title_id": title_id }),
        );
    }
}
