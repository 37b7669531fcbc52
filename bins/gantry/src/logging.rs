use std::io;
use std::sync::Arc;

use gantry_core::observability::{
    emit_ndjson, EventLog, LogEvent, LogIdentity, LogLevel, NdjsonEventSink,
};

pub fn log_event(
    trace_id: &str,
    level: LogLevel,
    span_id: &str,
    code: &str,
    message: &str,
    context: serde_json::Value,
) {
    let event = LogEvent::new(
        level,
        code,
        message,
        LogIdentity::new(trace_id, span_id, "unknown", "gantry"),
        context,
    );

    let mut stderr = io::stderr();
    let _ = emit_ndjson(&mut stderr, &event);
}

/// Core event log writing NDJSON to stderr. `--verbose` lowers the floor to debug.
pub fn core_event_log(trace_id: &str, verbose: bool) -> EventLog {
    let min_level = if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    EventLog::new(
        Arc::new(NdjsonEventSink::new(io::stderr(), min_level)),
        trace_id,
    )
}
