//! Launch state machine: preparing, spawning, supervising and tearing down
//! one title launch.

mod outcome;
mod phase;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::{normalize_legacy_path, GlobalSettings, LaunchSettings, RuntimeDescriptor};
use crate::context::LaunchRuntimeContext;
use crate::env::{compose_environment, EnvComposition, EnvMap};
use crate::error::{FailureKind, LaunchFailure};
use crate::inhibitor::InhibitorLease;
use crate::observability::EventLog;
use crate::playtime::record_session;
use crate::ports::{
    ConfigurationPort, DialogPort, LaunchStatus, PlaytimeStore, PresencePort, SaveSyncPort,
    StatusBroadcaster, SyncDirection, TitleLog, TitleLogFactory,
};
use crate::process::redact::redact;
use crate::process::{
    ExecutionClass, ExecutionRequest, ExecutionResult, InvocationMode, OutputSink, OutputStream,
};
use crate::runtime::{path_to_string, strategy_for, RunVerb};
use crate::wrappers::{build_wrapper_chain, WrapperChain};

pub use outcome::{CommandOutput, LaunchOutcome, OutcomeStatus, ValidationReport};
pub use phase::LaunchPhase;
use phase::PhaseTrace;

const SPAN: &str = "launch";

/// External collaborators the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigurationPort>,
    pub status: Arc<dyn StatusBroadcaster>,
    pub dialog: Arc<dyn DialogPort>,
    pub save_sync: Arc<dyn SaveSyncPort>,
    pub presence: Arc<dyn PresencePort>,
    pub title_logs: Arc<dyn TitleLogFactory>,
    pub playtime: Arc<dyn PlaytimeStore>,
}

pub struct LaunchOrchestrator {
    ctx: Arc<LaunchRuntimeContext>,
    ports: Collaborators,
}

#[derive(Debug, Clone, Copy)]
enum ScriptStage {
    PreLaunch,
    PostLaunch,
}

impl ScriptStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::PreLaunch => "pre-launch",
            Self::PostLaunch => "post-launch",
        }
    }
}

/// Everything the preparing phases resolved for one launch.
struct Prepared {
    settings: LaunchSettings,
    global: GlobalSettings,
    runtime: RuntimeDescriptor,
    env: EnvMap,
    chain: WrapperChain,
}

impl LaunchOrchestrator {
    pub fn new(ctx: Arc<LaunchRuntimeContext>, ports: Collaborators) -> Self {
        Self { ctx, ports }
    }

    pub fn context(&self) -> &LaunchRuntimeContext {
        &self.ctx
    }

    /// Runs one launch to completion and reports how it ended.
    ///
    /// Never panics and never returns an opaque error: every failure is a
    /// [`LaunchFailure`] inside the outcome, and status `error` is broadcast
    /// exactly once in that case.
    pub async fn launch(&self, title_id: &str) -> LaunchOutcome {
        let log = self.ctx.log.for_title(title_id);
        let title_log = self.ports.title_logs.open(title_id);
        let mut trace = PhaseTrace::new(log.clone());

        log.info(SPAN, "GT-LN-010", "launch_requested", json!({}));

        let prepared = match self.prepare(title_id, &log, &title_log, &mut trace).await {
            Ok(prepared) => prepared,
            Err((runner_name, failure)) => {
                return self.fail_preparing(
                    title_id,
                    &runner_name,
                    failure,
                    &log,
                    &title_log,
                    trace,
                );
            }
        };

        trace.enter(LaunchPhase::ReadyToSpawn);
        let argv = launch_argv(&prepared.settings, &prepared.runtime, &prepared.chain);
        let Some(request) = ExecutionRequest::from_argv(argv) else {
            let failure = LaunchFailure::configuration(title_id, "launch command is empty");
            return self.fail_preparing(
                title_id,
                &prepared.runtime.name,
                failure,
                &log,
                &title_log,
                trace,
            );
        };
        let request = self
            .attach(request, &prepared, &title_log)
            .with_class(ExecutionClass::Game)
            .with_abort_id(title_id);

        let echoed = redact(InvocationMode::Direct, &request.argv()).command;
        title_log.write_string(&format!("$ {echoed}\n"));

        trace.enter(LaunchPhase::Running);
        let lease = prepared
            .global
            .prevent_display_sleep
            .then(|| self.ctx.inhibitor.acquire(&log));
        let started = Utc::now();
        let result = self.run_game(title_id, &prepared, request).await;

        trace.enter(LaunchPhase::CleaningUp);
        let played_secs = self
            .clean_up(title_id, &prepared, &result, started, lease, &log, &title_log)
            .await;

        let failure = match result.failure_kind() {
            None | Some(FailureKind::UserAborted) => None,
            Some(kind) => Some(LaunchFailure::new(kind, title_id, result.describe())),
        };

        let status = if let Some(failure) = &failure {
            log.error(
                SPAN,
                "GT-LN-090",
                "launch_failed",
                json!({ "code": failure.kind.code(), "detail": failure.detail }),
            );
            title_log.log_error(&failure.to_string());
            OutcomeStatus::Error
        } else {
            log.info(
                SPAN,
                "GT-LN-080",
                "launch_finished",
                json!({
                    "exit_code": result.exit_code,
                    "aborted": result.aborted,
                    "coalesced": result.coalesced,
                    "played_secs": played_secs,
                }),
            );
            OutcomeStatus::Done
        };
        title_log.close();

        let broadcast = match status {
            OutcomeStatus::Done => LaunchStatus::Done,
            OutcomeStatus::Error => LaunchStatus::Error,
        };
        self.broadcast(title_id, &prepared.runtime.name, broadcast);
        trace.enter(LaunchPhase::Done);

        LaunchOutcome {
            title_id: title_id.to_string(),
            status,
            failure,
            exit_code: result.exit_code,
            signal: result.signal,
            aborted: result.aborted,
            coalesced: result.coalesced,
            played_secs,
            phases: trace.into_phases(),
        }
    }

    /// Runs `argv` inside the title's runtime and prefix, e.g. `winecfg` or a
    /// registry import, and returns its captured output.
    pub async fn run_command_for_title(
        &self,
        title_id: &str,
        argv: Vec<String>,
    ) -> Result<CommandOutput, LaunchFailure> {
        if argv.is_empty() {
            return Err(LaunchFailure::configuration(title_id, "no command given"));
        }

        let log = self.ctx.log.for_title(title_id);
        let (settings, _global) = self.load(title_id).await?;
        let runtime = resolved_runtime(&settings);

        if !runtime.is_native() {
            self.ctx
                .verifier
                .check(title_id, &runtime, &log)
                .map_err(|reason| unusable_runtime(title_id, &runtime, &reason))?;
        }

        let composed = compose_environment(&settings, self.ctx.verifier.host().os);
        log_env_warnings(&log, &composed);
        self.ctx
            .verifier
            .ensure_prefix(&settings, &composed.vars, &self.ctx.runner, &log)
            .await?;

        let prefix = settings.prefix_path.as_deref().map(normalize_legacy_path);
        let mut full =
            strategy_for(runtime.kind).command_prefix(&runtime, prefix.as_deref(), RunVerb::Run);
        full.extend(argv);

        let Some(mut request) = ExecutionRequest::from_argv(full) else {
            return Err(LaunchFailure::configuration(title_id, "no command given"));
        };
        request = request
            .with_env(composed.vars)
            .with_runtime(runtime.name.clone())
            .for_title(title_id)
            .with_class(ExecutionClass::Auxiliary);
        if let Some(prefix) = prefix {
            request = request.with_prefix(prefix);
        }
        if let Some(cwd) = working_dir(&settings) {
            request = request.with_cwd(cwd);
        }

        let result = self.ctx.runner.execute(request).await;
        let failure = result
            .failure_kind()
            .map(|kind| LaunchFailure::new(kind, title_id, result.describe()));

        log.info(
            SPAN,
            "GT-LN-060",
            "title_command_finished",
            json!({
                "command": result.command,
                "exit_code": result.exit_code,
                "success": result.success(),
            }),
        );

        Ok(CommandOutput {
            success: result.success(),
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            failure,
        })
    }

    /// Stops whatever is registered under `id` (a title id for running
    /// games). Idempotent.
    pub fn abort(&self, id: &str) -> bool {
        self.ctx.runner.abort(id)
    }

    /// Resolves a title's launch without spawning anything.
    pub async fn validate_title(&self, title_id: &str) -> Result<ValidationReport, LaunchFailure> {
        let log = self.ctx.log.for_title(title_id);
        let (settings, global) = self.load(title_id).await?;
        let runtime = resolved_runtime(&settings);

        let reason = if runtime.is_native() {
            None
        } else {
            self.ctx.verifier.check(title_id, &runtime, &log).err()
        };

        let prefix_ready = settings
            .prefix_path
            .as_deref()
            .map(normalize_legacy_path)
            .and_then(|prefix| strategy_for(runtime.kind).prefix_signature(&runtime, &prefix))
            .map(|signature| signature.exists());

        let composed = compose_environment(&settings, self.ctx.verifier.host().os);
        let chain = build_wrapper_chain(&settings.wrappers, &global.tools);
        let command = redact(
            InvocationMode::Direct,
            &launch_argv(&settings, &runtime, &chain),
        )
        .command;

        Ok(ValidationReport {
            title_id: title_id.to_string(),
            state: self.ctx.verifier.state(title_id, &runtime.name),
            runtime: runtime.name.clone(),
            kind: runtime.kind,
            valid: reason.is_none(),
            reason,
            prefix_ready,
            command,
            env_warnings: composed.warnings,
            wrapper_notes: chain.notes,
        })
    }

    async fn prepare(
        &self,
        title_id: &str,
        log: &EventLog,
        title_log: &Arc<dyn TitleLog>,
        trace: &mut PhaseTrace,
    ) -> Result<Prepared, (String, LaunchFailure)> {
        trace.enter(LaunchPhase::PreparingCommon);

        let (settings, global) = self
            .load(title_id)
            .await
            .map_err(|failure| ("unknown".to_string(), failure))?;
        let runtime = resolved_runtime(&settings);
        let fail = |failure: LaunchFailure| (runtime.name.clone(), failure);

        self.broadcast(title_id, &runtime.name, LaunchStatus::Launching);
        title_log.log_info(&format!(
            "launching {} with {}",
            settings.label(),
            runtime.name
        ));

        if settings.sync_saves {
            self.broadcast(title_id, &runtime.name, LaunchStatus::SyncingSaves);
            if let Err(reason) = self
                .ports
                .save_sync
                .sync(&settings, SyncDirection::Download)
                .await
            {
                log.warn(
                    SPAN,
                    "GT-LN-030",
                    "save_download_failed",
                    json!({ "reason": reason }),
                );
            }
        }

        if runtime.is_native() {
            let composed = compose_environment(&settings, self.ctx.verifier.host().os);
            log_env_warnings(log, &composed);
            let chain = build_wrapper_chain(&settings.wrappers, &global.tools);
            log_wrapper_notes(log, title_log, &chain);
            return Ok(Prepared {
                settings,
                global,
                runtime,
                env: composed.vars,
                chain,
            });
        }

        self.ctx
            .verifier
            .check(title_id, &runtime, log)
            .map_err(|reason| fail(unusable_runtime(title_id, &runtime, &reason)))?;

        trace.enter(LaunchPhase::PreparingRuntime);

        let composed = compose_environment(&settings, self.ctx.verifier.host().os);
        log_env_warnings(log, &composed);

        let chain = build_wrapper_chain(&settings.wrappers, &global.tools);
        log_wrapper_notes(log, title_log, &chain);

        self.ctx
            .verifier
            .ensure_prefix(&settings, &composed.vars, &self.ctx.runner, log)
            .await
            .map_err(fail)?;

        let prepared = Prepared {
            settings,
            global,
            runtime,
            env: composed.vars,
            chain,
        };
        self.run_script(&prepared, ScriptStage::PreLaunch, log, title_log)
            .await
            .map_err(|failure| (prepared.runtime.name.clone(), failure))?;

        Ok(prepared)
    }

    async fn run_game(
        &self,
        title_id: &str,
        prepared: &Prepared,
        request: ExecutionRequest,
    ) -> ExecutionResult {
        self.broadcast(title_id, &prepared.runtime.name, LaunchStatus::Playing);
        if prepared.global.presence_enabled {
            self.ports
                .presence
                .set_playing(title_id, prepared.settings.label());
        }

        self.ctx.runner.execute(request).await
    }

    /// Runs the teardown steps and returns the seconds recorded as played.
    #[allow(clippy::too_many_arguments)]
    async fn clean_up(
        &self,
        title_id: &str,
        prepared: &Prepared,
        result: &ExecutionResult,
        started: DateTime<Utc>,
        lease: Option<InhibitorLease<'_>>,
        log: &EventLog,
        title_log: &Arc<dyn TitleLog>,
    ) -> u64 {
        let ended = Utc::now();
        if prepared.global.presence_enabled {
            self.ports.presence.clear(title_id);
        }

        // The leading launch owns the session: scripts, playtime and uploads.
        if result.coalesced {
            drop(lease);
            return 0;
        }

        // Post-launch failures never fail the launch.
        let _ = self
            .run_script(prepared, ScriptStage::PostLaunch, log, title_log)
            .await;

        let played_secs = u64::try_from((ended - started).num_seconds()).unwrap_or(0);
        if result.spawn_error.is_none() {
            if let Err(err) = record_session(self.ports.playtime.as_ref(), title_id, started, ended)
            {
                log.warn(
                    SPAN,
                    "GT-LN-075",
                    "playtime_record_failed",
                    json!({ "error": err.to_string() }),
                );
            }
        }

        drop(lease);

        if prepared.settings.sync_saves {
            self.broadcast(title_id, &prepared.runtime.name, LaunchStatus::SyncingSaves);
            if let Err(reason) = self
                .ports
                .save_sync
                .sync(&prepared.settings, SyncDirection::Upload)
                .await
            {
                log.warn(
                    SPAN,
                    "GT-LN-070",
                    "save_upload_failed",
                    json!({ "reason": reason }),
                );
                title_log.log_error(&format!("save upload failed: {reason}"));
            }
        }

        played_secs
    }

    async fn run_script(
        &self,
        prepared: &Prepared,
        stage: ScriptStage,
        log: &EventLog,
        title_log: &Arc<dyn TitleLog>,
    ) -> Result<(), LaunchFailure> {
        let scripts = &prepared.settings.scripts;
        let (script, fatal) = match stage {
            ScriptStage::PreLaunch => (&scripts.pre_launch, scripts.pre_launch_fatal),
            ScriptStage::PostLaunch => (&scripts.post_launch, false),
        };
        if script.trim().is_empty() {
            return Ok(());
        }

        let request = self
            .attach(ExecutionRequest::shell(script.clone()), prepared, title_log)
            .with_class(ExecutionClass::Auxiliary);
        let result = self.ctx.runner.execute(request).await;

        if result.success() {
            log.info(
                SPAN,
                "GT-LN-040",
                "script_finished",
                json!({ "stage": stage.as_str() }),
            );
            return Ok(());
        }

        let failure = LaunchFailure::new(
            FailureKind::ScriptFailed,
            prepared.settings.title_id.clone(),
            format!("{} script {}", stage.as_str(), result.describe()),
        );
        log.warn(
            SPAN,
            "GT-LN-045",
            "script_failed",
            json!({ "stage": stage.as_str(), "fatal": fatal, "detail": failure.detail }),
        );

        if fatal {
            Err(failure)
        } else {
            title_log.log_error(&failure.to_string());
            Ok(())
        }
    }

    async fn load(&self, title_id: &str) -> Result<(LaunchSettings, GlobalSettings), LaunchFailure> {
        let global = self
            .ports
            .config
            .global_settings()
            .await
            .map_err(|err| LaunchFailure::configuration(title_id, err.to_string()))?;
        let settings = self
            .ports
            .config
            .title_settings(title_id)
            .await
            .map_err(|err| LaunchFailure::configuration(title_id, err.to_string()))?
            .with_defaults(&global);

        if settings.executable.trim().is_empty() {
            return Err(LaunchFailure::configuration(
                title_id,
                "no executable configured",
            ));
        }
        Ok((settings, global))
    }

    fn attach(
        &self,
        request: ExecutionRequest,
        prepared: &Prepared,
        title_log: &Arc<dyn TitleLog>,
    ) -> ExecutionRequest {
        let mut request = request
            .with_env(prepared.env.clone())
            .with_runtime(prepared.runtime.name.clone())
            .for_title(prepared.settings.title_id.clone())
            .with_sink(Arc::new(TitleLogSink(Arc::clone(title_log))));
        if let Some(prefix) = prepared.settings.prefix_path.as_deref() {
            request = request.with_prefix(normalize_legacy_path(prefix));
        }
        if let Some(cwd) = working_dir(&prepared.settings) {
            request = request.with_cwd(cwd);
        }
        request
    }

    fn fail_preparing(
        &self,
        title_id: &str,
        runner_name: &str,
        failure: LaunchFailure,
        log: &EventLog,
        title_log: &Arc<dyn TitleLog>,
        mut trace: PhaseTrace,
    ) -> LaunchOutcome {
        log.error(
            SPAN,
            "GT-LN-090",
            "launch_failed",
            json!({
                "phase": trace.current().as_str(),
                "code": failure.kind.code(),
                "detail": failure.detail,
            }),
        );
        title_log.log_error(&failure.to_string());
        title_log.close();

        if failure.kind.is_user_facing() {
            self.ports.dialog.show_failure(&failure);
        }
        self.broadcast(title_id, runner_name, LaunchStatus::Error);
        trace.enter(LaunchPhase::Failed);

        LaunchOutcome::failed(title_id, failure, trace.into_phases())
    }

    fn broadcast(&self, title_id: &str, runner_name: &str, status: LaunchStatus) {
        self.ports
            .status
            .send_status(title_id, runner_name, status, None);
    }
}

/// Wrapper chain, then the runtime's command prefix, then the title binary
/// and its arguments.
pub fn launch_argv(
    settings: &LaunchSettings,
    runtime: &RuntimeDescriptor,
    chain: &WrapperChain,
) -> Vec<String> {
    let prefix = settings.prefix_path.as_deref().map(normalize_legacy_path);

    let mut argv = chain.tokens.clone();
    argv.extend(strategy_for(runtime.kind).command_prefix(
        runtime,
        prefix.as_deref(),
        RunVerb::Launch,
    ));
    argv.push(path_to_string(&settings.executable_path()));
    argv.extend(settings.launch_args.iter().cloned());
    argv
}

fn resolved_runtime(settings: &LaunchSettings) -> RuntimeDescriptor {
    settings
        .runtime
        .clone()
        .unwrap_or_else(RuntimeDescriptor::native)
}

fn unusable_runtime(title_id: &str, runtime: &RuntimeDescriptor, reason: &str) -> LaunchFailure {
    LaunchFailure::configuration(
        title_id,
        format!("runtime '{}' is not usable: {reason}", runtime.name),
    )
}

fn working_dir(settings: &LaunchSettings) -> Option<PathBuf> {
    let dir = normalize_legacy_path(&settings.install_path);
    dir.is_dir().then_some(dir)
}

fn log_env_warnings(log: &EventLog, composed: &EnvComposition) {
    for warning in &composed.warnings {
        log.warn(
            "environment",
            "GT-LN-020",
            "env_rule_skipped",
            json!({ "rule": warning.rule, "message": warning.message }),
        );
    }
}

fn log_wrapper_notes(log: &EventLog, title_log: &Arc<dyn TitleLog>, chain: &WrapperChain) {
    for note in &chain.notes {
        log.warn(SPAN, "GT-LN-025", "wrapper_skipped", json!({ "note": note }));
        title_log.log_info(note);
    }
}

/// Streams live process output into the title's log.
struct TitleLogSink(Arc<dyn TitleLog>);

#[async_trait]
impl OutputSink for TitleLogSink {
    async fn write_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => self.0.write_string(&format!("{line}\n")),
            OutputStream::Stderr => self.0.write_string(&format!("[stderr] {line}\n")),
        }
    }
}
