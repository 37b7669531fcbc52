use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogIdentity {
    pub trace_id: String,
    pub span_id: String,
    pub title_id: String,
    pub component: String,
}

impl LogIdentity {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        title_id: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            title_id: title_id.into(),
            component: component.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEvent {
    pub ts: String,
    pub level: LogLevel,
    pub event_code: String,
    pub message: String,
    pub trace_id: String,
    pub span_id: String,
    pub title_id: String,
    pub component: String,
    pub context: Value,
}

impl LogEvent {
    pub fn new(
        level: LogLevel,
        event_code: impl Into<String>,
        message: impl Into<String>,
        identity: LogIdentity,
        context: Value,
    ) -> Self {
        Self {
            ts: now_utc_rfc3339_millis(),
            level,
            event_code: event_code.into(),
            message: message.into(),
            trace_id: identity.trace_id,
            span_id: identity.span_id,
            title_id: identity.title_id,
            component: identity.component,
            context,
        }
    }
}

/// Structured info/warning/error sink supplied by the logging collaborator.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Scoped emitter that stamps every event with the same trace and title.
#[derive(Clone)]
pub struct EventLog {
    sink: Arc<dyn EventSink>,
    trace_id: String,
    title_id: String,
}

impl EventLog {
    pub fn new(sink: Arc<dyn EventSink>, trace_id: impl Into<String>) -> Self {
        Self {
            sink,
            trace_id: trace_id.into(),
            title_id: String::new(),
        }
    }

    pub fn for_title(&self, title_id: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            trace_id: self.trace_id.clone(),
            title_id: title_id.into(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn event(&self, level: LogLevel, span_id: &str, code: &str, message: &str, context: Value) {
        let event = LogEvent::new(
            level,
            code,
            message,
            LogIdentity::new(&self.trace_id, span_id, &self.title_id, "gantry-core"),
            context,
        );
        self.sink.emit(&event);
    }

    pub fn info(&self, span_id: &str, code: &str, message: &str, context: Value) {
        self.event(LogLevel::Info, span_id, code, message, context);
    }

    pub fn warn(&self, span_id: &str, code: &str, message: &str, context: Value) {
        self.event(LogLevel::Warn, span_id, code, message, context);
    }

    pub fn error(&self, span_id: &str, code: &str, message: &str, context: Value) {
        self.event(LogLevel::Error, span_id, code, message, context);
    }
}

/// Writes every event as one JSON line.
pub struct NdjsonEventSink<W: Write + Send> {
    writer: Mutex<W>,
    min_level: LogLevel,
}

impl<W: Write + Send> NdjsonEventSink<W> {
    pub fn new(writer: W, min_level: LogLevel) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level,
        }
    }
}

impl<W: Write + Send> EventSink for NdjsonEventSink<W> {
    fn emit(&self, event: &LogEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(mut writer) = self.writer.lock() {
            let _ = emit_ndjson(&mut *writer, event);
        }
    }
}

/// Keeps events in memory; used by tests and diagnostics.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventSink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn codes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event_code)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

pub fn now_utc_rfc3339_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn emit_ndjson<W: Write + ?Sized>(writer: &mut W, event: &LogEvent) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, event)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_single_json_line() {
        let mut buffer = Vec::<u8>::new();
        let event = LogEvent::new(
            LogLevel::Info,
            "GT-LN-001",
            "launch_started",
            LogIdentity::new("trace-1", "launch", "celeste", "gantry-core"),
            serde_json::json!({"phase": "preparing-common"}),
        );

        emit_ndjson(&mut buffer, &event).expect("write event");
        let rendered = String::from_utf8(buffer).expect("utf8");

        assert!(rendered.ends_with('\n'));
        assert_eq!(rendered.matches('\n').count(), 1);
        assert!(rendered.contains("GT-LN-001"));
        assert!(rendered.contains("\"title_id\":\"celeste\""));
    }

    #[test]
    fn ndjson_sink_filters_below_min_level() {
        let sink = NdjsonEventSink::new(Vec::<u8>::new(), LogLevel::Warn);
        let log = EventLog::new(Arc::new(MemoryEventSink::default()), "trace");
        let identity = LogIdentity::new(log.trace_id(), "span", "", "test");

        sink.emit(&LogEvent::new(
            LogLevel::Info,
            "GT-T-001",
            "ignored",
            identity.clone(),
            Value::Null,
        ));
        sink.emit(&LogEvent::new(
            LogLevel::Error,
            "GT-T-002",
            "kept",
            identity,
            Value::Null,
        ));

        let written = sink.writer.into_inner().expect("writer");
        let rendered = String::from_utf8(written).expect("utf8");
        assert!(!rendered.contains("GT-T-001"));
        assert!(rendered.contains("GT-T-002"));
    }

    #[test]
    fn scoped_log_stamps_title_and_trace() {
        let memory = Arc::new(MemoryEventSink::default());
        let log = EventLog::new(memory.clone(), "trace-9").for_title("hades");

        log.warn("env", "GT-ENV-002", "library_path_missing", Value::Null);

        let events = memory.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trace_id, "trace-9");
        assert_eq!(events[0].title_id, "hades");
        assert_eq!(events[0].level, LogLevel::Warn);
    }
}
