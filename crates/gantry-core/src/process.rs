pub mod abort;
mod buffer;
pub mod redact;
pub mod sink;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::env::EnvMap;
use crate::error::FailureKind;
use crate::observability::EventLog;

pub use abort::AbortRegistry;
pub use buffer::DEFAULT_CAPTURE_LIMIT;
pub use redact::REDACTED;
pub use sink::{MemoryOutputSink, OutputSink, OutputStream};

use buffer::TailBuffer;
use redact::Redaction;
use sink::{FanoutHandle, SinkFanout, SINK_QUEUE_CAPACITY};

/// Time a process gets between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How long output readers may lag behind process exit. Daemons forked by a
/// runtime can inherit the pipes and keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Longest piece of one output line read at a time. Longer lines reach
/// sinks and the capture buffer in pieces.
const LINE_CHUNK_BYTES: u64 = 64 * 1024;

const SPAN: &str = "process";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// `program` is executed with `args` as separate argv entries.
    #[default]
    Direct,
    /// `args` end with a script string interpreted by `sh -c`.
    Shell,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionClass {
    /// The title itself. Never throttled.
    Game,
    /// Prefix init, scripts and tools. Limited by `max_workers`.
    #[default]
    Auxiliary,
}

#[derive(Clone)]
pub struct ExecutionRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: EnvMap,
    pub cwd: Option<PathBuf>,
    pub mode: InvocationMode,
    pub class: ExecutionClass,
    /// Runtime the command runs under; part of the dedup key.
    pub runtime_name: String,
    /// Prefix selected through the environment; part of the dedup key.
    pub prefix: Option<PathBuf>,
    pub title_id: String,
    pub abort_id: Option<String>,
    pub sinks: Vec<Arc<dyn OutputSink>>,
}

impl ExecutionRequest {
    pub fn direct(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: EnvMap::new(),
            cwd: None,
            mode: InvocationMode::Direct,
            class: ExecutionClass::default(),
            runtime_name: String::new(),
            prefix: None,
            title_id: String::new(),
            abort_id: None,
            sinks: Vec::new(),
        }
    }

    /// Builds a direct request from a full argv. `None` when `argv` is empty.
    pub fn from_argv(mut argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        let program = argv.remove(0);
        Some(Self::direct(program, argv))
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            mode: InvocationMode::Shell,
            ..Self::direct("sh", vec!["-c".to_string(), script.into()])
        }
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_class(mut self, class: ExecutionClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_runtime(mut self, runtime_name: impl Into<String>) -> Self {
        self.runtime_name = runtime_name.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn for_title(mut self, title_id: impl Into<String>) -> Self {
        self.title_id = title_id.into();
        self
    }

    pub fn with_abort_id(mut self, abort_id: impl Into<String>) -> Self {
        self.abort_id = Some(abort_id.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Identity used to coalesce concurrent duplicates: runtime, prefix and
    /// argv. Wine-style runtimes take the prefix from the environment, so two
    /// prefixes can share an identical argv.
    pub fn canonical_key(&self) -> String {
        let mut key = self.runtime_name.clone();
        if let Some(prefix) = &self.prefix {
            key.push('\u{1e}');
            key.push_str(&prefix.to_string_lossy());
        }
        for token in self.argv() {
            key.push('\u{1f}');
            key.push_str(&token);
        }
        key
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Redacted command line.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub aborted: bool,
    /// Captured output hit the buffer limit and lost its oldest lines.
    pub truncated: bool,
    pub spawn_error: Option<String>,
    pub dropped_sink_lines: u64,
    /// This caller joined an execution another caller started.
    pub coalesced: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.aborted && self.spawn_error.is_none() && self.exit_code == Some(0)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.spawn_error.is_some() {
            Some(FailureKind::ProcessSpawnFailed)
        } else if self.aborted {
            Some(FailureKind::UserAborted)
        } else if self.success() {
            None
        } else {
            Some(FailureKind::ProcessCrashed)
        }
    }

    pub fn describe(&self) -> String {
        if let Some(err) = &self.spawn_error {
            return format!("failed to start '{}': {err}", self.command);
        }
        if self.aborted {
            return "stopped on request".to_string();
        }
        match (self.exit_code, self.signal) {
            (_, Some(signal)) => format!("terminated by signal {signal}"),
            (Some(code), None) => format!("exited with code {code}"),
            (None, None) => "exit status unavailable".to_string(),
        }
    }

    fn spawn_failed(command: String, error: impl Into<String>) -> Self {
        Self {
            command,
            spawn_error: Some(error.into()),
            ..Self::default()
        }
    }
}

type Settled = Option<Arc<ExecutionResult>>;

/// Spawns and supervises external processes.
///
/// Clones share one in-flight registry and one abort registry, so the runner
/// is owned by the launch context and handed out by reference or clone.
#[derive(Clone)]
pub struct ProcessRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    log: EventLog,
    in_flight: Mutex<HashMap<String, watch::Receiver<Settled>>>,
    aborts: AbortRegistry,
    auxiliary_slots: Semaphore,
    capture_limit: usize,
    terminate_grace: Duration,
}

impl ProcessRunner {
    pub fn new(log: EventLog, max_workers: usize) -> Self {
        Self::with_limits(log, max_workers, DEFAULT_CAPTURE_LIMIT, TERMINATE_GRACE)
    }

    pub fn with_limits(
        log: EventLog,
        max_workers: usize,
        capture_limit: usize,
        terminate_grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                log,
                in_flight: Mutex::new(HashMap::new()),
                aborts: AbortRegistry::default(),
                auxiliary_slots: Semaphore::new(max_workers.max(1)),
                capture_limit,
                terminate_grace,
            }),
        }
    }

    /// Runs `request` to completion. A request whose canonical key is already
    /// in flight joins that execution instead of spawning a duplicate.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let key = request.canonical_key();
        let title_id = request.title_id.clone();
        let (mut settled, coalesced) = self.join_or_start(key, request);

        let shared = match settled.wait_for(Option::is_some).await {
            Ok(value) => Option::clone(&value),
            Err(_) => None,
        };

        let mut result = match shared {
            Some(result) => ExecutionResult::clone(&result),
            None => ExecutionResult::spawn_failed(
                String::new(),
                "execution ended without reporting a result",
            ),
        };

        if coalesced {
            result.coalesced = true;
            self.inner.log.for_title(title_id).info(
                SPAN,
                "GT-PX-050",
                "process_execution_coalesced",
                json!({ "command": result.command }),
            );
        }
        result
    }

    /// Cancels the execution registered under `id`. Safe to call repeatedly
    /// or after the process exited; returns whether anything was cancelled.
    pub fn abort(&self, id: &str) -> bool {
        let cancelled = self.inner.aborts.abort(id);
        self.inner.log.info(
            SPAN,
            "GT-PX-040",
            "process_abort_requested",
            json!({ "abort_id": id, "cancelled": cancelled }),
        );
        cancelled
    }

    pub fn is_running(&self, abort_id: &str) -> bool {
        self.inner.aborts.is_registered(abort_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Check and insert happen under one lock with no suspension point between.
    fn join_or_start(
        &self,
        key: String,
        request: ExecutionRequest,
    ) -> (watch::Receiver<Settled>, bool) {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(&key) {
            return (existing.clone(), true);
        }

        let (tx, rx) = watch::channel::<Settled>(None);
        in_flight.insert(key.clone(), rx.clone());
        drop(in_flight);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let entry = InFlightEntry {
                inner: Arc::clone(&inner),
                key,
            };
            let result = run(&inner, request).await;
            drop(entry);
            let _ = tx.send(Some(Arc::new(result)));
        });

        (rx, false)
    }
}

/// Removes the in-flight key when the execution settles, panics included.
struct InFlightEntry {
    inner: Arc<RunnerInner>,
    key: String,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

async fn run(inner: &RunnerInner, request: ExecutionRequest) -> ExecutionResult {
    let log = inner.log.for_title(&request.title_id);
    let redaction = Arc::new(redact::redact(request.mode, &request.argv()));

    // Registered before queueing for a slot so a waiting request can be
    // aborted too.
    let abort_id = request
        .abort_id
        .clone()
        .unwrap_or_else(|| request.canonical_key());
    let registration = inner.aborts.register(&abort_id);

    let _permit = match request.class {
        ExecutionClass::Auxiliary => tokio::select! {
            permit = inner.auxiliary_slots.acquire() => permit.ok(),
            () = registration.token().cancelled() => {
                log.info(
                    SPAN,
                    "GT-PX-045",
                    "process_aborted_before_spawn",
                    json!({ "command": redaction.command }),
                );
                return ExecutionResult {
                    command: redaction.command.clone(),
                    aborted: true,
                    ..ExecutionResult::default()
                };
            }
        },
        ExecutionClass::Game => None,
    };

    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            log.error(
                SPAN,
                "GT-PX-030",
                "process_spawn_failed",
                json!({ "command": redaction.command, "error": err.to_string() }),
            );
            return ExecutionResult::spawn_failed(redaction.command.clone(), err.to_string());
        }
    };

    log.info(
        SPAN,
        "GT-PX-010",
        "process_spawned",
        json!({
            "command": redaction.command,
            "pid": child.id(),
            "class": request.class,
            "abort_id_set": request.abort_id.is_some(),
        }),
    );

    let fanout = SinkFanout::start(&request.sinks, SINK_QUEUE_CAPACITY);
    let stdout = Arc::new(Mutex::new(TailBuffer::new(inner.capture_limit)));
    let stderr = Arc::new(Mutex::new(TailBuffer::new(inner.capture_limit)));
    let stdout_reader = child.stdout.take().map(|pipe| {
        spawn_reader(pipe, OutputStream::Stdout, &fanout, &redaction, &stdout)
    });
    let stderr_reader = child.stderr.take().map(|pipe| {
        spawn_reader(pipe, OutputStream::Stderr, &fanout, &redaction, &stderr)
    });

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = registration.token().cancelled() => None,
    };
    let aborted = exited.is_none();
    let status = match exited {
        Some(status) => status,
        None => terminate_then_kill(&mut child, inner.terminate_grace).await,
    };
    drop(registration);

    join_reader(stdout_reader).await;
    join_reader(stderr_reader).await;
    let dropped_sink_lines = fanout.finish(DRAIN_GRACE).await;

    let (stdout, stdout_truncated) = take_buffer(&stdout);
    let (stderr, stderr_truncated) = take_buffer(&stderr);
    let mut result = ExecutionResult {
        command: redaction.command.clone(),
        stdout,
        stderr,
        aborted,
        truncated: stdout_truncated || stderr_truncated,
        dropped_sink_lines,
        ..ExecutionResult::default()
    };

    match status {
        Ok(status) => {
            result.exit_code = status.code();
            result.signal = exit_signal(&status);
        }
        Err(err) => log.warn(
            SPAN,
            "GT-PX-025",
            "process_wait_failed",
            json!({ "command": result.command, "error": err.to_string() }),
        ),
    }

    log.info(
        SPAN,
        "GT-PX-020",
        "process_exited",
        json!({
            "command": result.command,
            "exit_code": result.exit_code,
            "signal": result.signal,
            "aborted": result.aborted,
            "truncated": result.truncated,
            "dropped_sink_lines": result.dropped_sink_lines,
        }),
    );

    result
}

fn spawn_reader<R>(
    pipe: R,
    stream: OutputStream,
    fanout: &SinkFanout,
    redaction: &Arc<Redaction>,
    buffer: &Arc<Mutex<TailBuffer>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(drain_lines(
        pipe,
        stream,
        fanout.handle(),
        Arc::clone(redaction),
        Arc::clone(buffer),
    ))
}

async fn drain_lines<R>(
    pipe: R,
    stream: OutputStream,
    fanout: FanoutHandle,
    redaction: Arc<Redaction>,
    buffer: Arc<Mutex<TailBuffer>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    // Bytes of the current line not yet emitted: at most one chunk plus an
    // unfinished UTF-8 sequence.
    let mut raw = Vec::new();

    loop {
        let read = (&mut reader)
            .take(LINE_CHUNK_BYTES)
            .read_until(b'\n', &mut raw)
            .await;
        if !matches!(read, Ok(n) if n > 0) {
            if !raw.is_empty() {
                emit_segment(&raw, false, stream, &fanout, &redaction, &buffer);
            }
            break;
        }

        let complete = raw.ends_with(b"\n");
        let end = if complete {
            raw.len()
        } else {
            complete_utf8_len(&raw)
        };
        if end > 0 {
            emit_segment(&raw[..end], complete, stream, &fanout, &redaction, &buffer);
            raw.drain(..end);
        }
    }
}

fn emit_segment(
    raw: &[u8],
    ends_line: bool,
    stream: OutputStream,
    fanout: &FanoutHandle,
    redaction: &Redaction,
    buffer: &Mutex<TailBuffer>,
) {
    let text = String::from_utf8_lossy(raw);
    let line = redaction.scrub(text.trim_end_matches(['\n', '\r']));
    fanout.send(stream, &line);

    let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    buffer.push(&line);
    if ends_line {
        buffer.push("\n");
    }
}

/// Length of the prefix of `bytes` that does not end inside a UTF-8 sequence.
fn complete_utf8_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        _ => bytes.len(),
    }
}

async fn join_reader(reader: Option<JoinHandle<()>>) {
    let Some(mut reader) = reader else {
        return;
    };
    if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
        reader.abort();
        let _ = reader.await;
    }
}

fn take_buffer(buffer: &Mutex<TailBuffer>) -> (String, bool) {
    let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    (buffer.joined(), buffer.truncated())
}

async fn terminate_then_kill(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return status;
    }

    let _ = child.start_kill();
    child.wait().await
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::observability::MemoryEventSink;
    use crate::test_support::TestDir;

    fn runner() -> (ProcessRunner, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::default());
        let log = EventLog::new(sink.clone(), "trace-test");
        (ProcessRunner::new(log, 2), sink)
    }

    fn sh(script: &std::path::Path, args: &[&str]) -> ExecutionRequest {
        let mut argv = vec![script.to_string_lossy().into_owned()];
        argv.extend(args.iter().map(ToString::to_string));
        ExecutionRequest::direct("/bin/sh", argv).with_runtime("test-runtime")
    }

    async fn wait_until_running(runner: &ProcessRunner, id: &str) {
        for _ in 0..200 {
            if runner.is_running(id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution '{id}' never registered");
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_spawn() {
        let dir = TestDir::new("single-flight");
        let counter = dir.path().join("count");
        let script = dir.write(
            "slow.sh",
            &format!("echo run >> '{}'\nsleep 0.3\necho done", counter.display()),
        );
        let (runner, _) = runner();
        let request = sh(&script, &[]);

        let (first, second) =
            tokio::join!(runner.execute(request.clone()), runner.execute(request.clone()));

        assert_eq!(dir.count_lines("count"), 1);
        assert_eq!(first.stdout, "done\n");
        assert_eq!(second.stdout, "done\n");
        assert_ne!(first.coalesced, second.coalesced);
        assert_eq!(runner.in_flight_count(), 0);

        let third = runner.execute(request).await;
        assert!(!third.coalesced);
        assert_eq!(dir.count_lines("count"), 2);
    }

    #[test]
    fn prefix_is_part_of_the_dedup_key() {
        let request = ExecutionRequest::direct("wine", vec!["winecfg".to_string()])
            .with_runtime("wine-ge-8");
        let celeste = request.clone().with_prefix("/prefixes/celeste");
        let hades = request.clone().with_prefix("/prefixes/hades");

        assert_ne!(celeste.canonical_key(), hades.canonical_key());
        assert_ne!(celeste.canonical_key(), request.canonical_key());
        assert_eq!(
            celeste.canonical_key(),
            celeste.clone().for_title("other").canonical_key()
        );
    }

    #[tokio::test]
    async fn failed_execution_still_clears_in_flight_key() {
        let (runner, _) = runner();
        let request = ExecutionRequest::direct("/nonexistent/gantry/binary", Vec::new());

        let result = runner.execute(request).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ProcessSpawnFailed));
        assert!(result.spawn_error.is_some());
        assert_eq!(runner.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_resolves_once() {
        let dir = TestDir::new("abort");
        let script = dir.write("wait.sh", "exec sleep 30");
        let (runner, _) = runner();
        let request = sh(&script, &[])
            .with_abort_id("celeste")
            .with_class(ExecutionClass::Game);

        let task = tokio::spawn({
            let runner = runner.clone();
            async move { runner.execute(request).await }
        });
        wait_until_running(&runner, "celeste").await;

        assert!(runner.abort("celeste"));
        assert!(!runner.abort("celeste"));

        let result = task.await.expect("join");
        assert!(result.aborted);
        assert_eq!(result.failure_kind(), Some(FailureKind::UserAborted));
        assert!(!runner.abort("celeste"));
        assert!(!runner.is_running("celeste"));
    }

    #[tokio::test]
    async fn abort_while_waiting_for_a_slot_never_spawns() {
        let dir = TestDir::new("abort-queued");
        let busy = dir.write("busy.sh", "exec sleep 30");
        let marker = dir.path().join("started");
        let queued = dir.write("queued.sh", &format!("touch '{}'", marker.display()));
        let sink = Arc::new(MemoryEventSink::default());
        let runner = ProcessRunner::with_limits(
            EventLog::new(sink, "t"),
            1,
            DEFAULT_CAPTURE_LIMIT,
            TERMINATE_GRACE,
        );

        let holder = tokio::spawn({
            let runner = runner.clone();
            let request = sh(&busy, &[]).with_abort_id("winecfg");
            async move { runner.execute(request).await }
        });
        wait_until_running(&runner, "winecfg").await;

        let waiter = tokio::spawn({
            let runner = runner.clone();
            let request = sh(&queued, &[]).with_abort_id("pre-launch");
            async move { runner.execute(request).await }
        });
        wait_until_running(&runner, "pre-launch").await;

        assert!(runner.abort("pre-launch"));
        let result = waiter.await.expect("join");
        assert!(result.aborted);
        assert!(result.spawn_error.is_none());
        assert!(!marker.exists());

        assert!(runner.abort("winecfg"));
        assert!(holder.await.expect("join").aborted);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn signal_and_non_zero_exit_are_crashes() {
        let dir = TestDir::new("exit-kinds");
        let killed = dir.write("killed.sh", "kill -9 $$");
        let failed = dir.write("failed.sh", "echo oops >&2\nexit 3");
        let (runner, _) = runner();

        let result = runner.execute(sh(&killed, &[])).await;
        assert_eq!(result.signal, Some(9));
        assert!(!result.aborted);
        assert_eq!(result.failure_kind(), Some(FailureKind::ProcessCrashed));

        let result = runner.execute(sh(&failed, &[])).await;
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.failure_kind(), Some(FailureKind::ProcessCrashed));
    }

    #[tokio::test]
    async fn token_never_reaches_sinks_or_logs() {
        let dir = TestDir::new("redact");
        let script = dir.write("echo.sh", "echo \"authenticating with $2\"");
        let (runner, events) = runner();
        let output = Arc::new(MemoryOutputSink::default());

        let result = runner
            .execute(sh(&script, &["--token", "SECRET123"]).with_sink(output.clone()))
            .await;

        assert!(result.success());
        assert_eq!(output.text(), "authenticating with <redacted>");
        assert!(!result.stdout.contains("SECRET123"));
        assert!(!result.command.contains("SECRET123"));
        for event in events.events() {
            let line = serde_json::to_string(&event).expect("serialize event");
            assert!(!line.contains("SECRET123"), "leaked in {line}");
        }
    }

    #[tokio::test]
    async fn shell_mode_runs_script_with_merged_env() {
        let (runner, _) = runner();
        let mut env = EnvMap::new();
        env.insert("GANTRY_TEST_VALUE".to_string(), "42".to_string());

        let result = runner
            .execute(ExecutionRequest::shell("echo value=$GANTRY_TEST_VALUE").with_env(env))
            .await;

        assert!(result.success());
        assert_eq!(result.stdout, "value=42\n");
    }

    #[tokio::test]
    async fn capture_limit_keeps_tail() {
        let sink = Arc::new(MemoryEventSink::default());
        let runner =
            ProcessRunner::with_limits(EventLog::new(sink, "t"), 1, 16, TERMINATE_GRACE);

        let result = runner
            .execute(ExecutionRequest::shell(
                "for i in 1 2 3 4 5 6 7 8 9; do echo line$i; done",
            ))
            .await;

        assert!(result.truncated);
        assert!(result.stdout.ends_with("line9\n"));
        assert!(!result.stdout.contains("line1\n"));
    }

    #[tokio::test]
    async fn endless_line_keeps_its_tail() {
        let sink = Arc::new(MemoryEventSink::default());
        let runner =
            ProcessRunner::with_limits(EventLog::new(sink, "t"), 1, 1024, TERMINATE_GRACE);
        let output = Arc::new(MemoryOutputSink::default());

        let result = runner
            .execute(
                ExecutionRequest::shell(
                    "head -c 300000 /dev/zero | tr '\\0' x; printf 'FATAL: crash'",
                )
                .with_sink(output.clone()),
            )
            .await;

        assert!(result.success());
        assert!(result.truncated);
        assert!(result.stdout.len() <= 1024);
        assert!(result.stdout.ends_with("FATAL: crash"));
        assert!(output
            .lines()
            .iter()
            .all(|(_, line)| line.len() <= LINE_CHUNK_BYTES as usize));
    }
}
