mod launch;
mod run;
mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use gantry_core::observability::LogLevel;
use gantry_core::platform::HostInfo;
use gantry_core::ports::ConfigurationPort;
use gantry_core::{Collaborators, LaunchOrchestrator, LaunchRuntimeContext};

pub use launch::run_launch;
pub use run::run_in_title;
pub use validate::run_validate;

use crate::cli::Cli;
use crate::infrastructure::dialog::StderrDialog;
use crate::infrastructure::fs_config::FsConfig;
use crate::infrastructure::inhibitor::host_inhibitor;
use crate::infrastructure::paths::{resolve_config_dir, resolve_data_dir};
use crate::infrastructure::playtime_store::JsonPlaytimeStore;
use crate::infrastructure::presence::LoggedPresence;
use crate::infrastructure::save_sync::NoSaveSync;
use crate::infrastructure::status::StdoutStatus;
use crate::infrastructure::title_log::FileTitleLogs;
use crate::logging::{core_event_log, log_event};

/// Composition root: one launch context and orchestrator per process.
pub struct App {
    pub trace_id: String,
    pub orchestrator: Arc<LaunchOrchestrator>,
    pub logs_dir: PathBuf,
}

impl App {
    pub async fn build(cli: &Cli, trace_id: &str) -> anyhow::Result<Self> {
        let config_dir = resolve_config_dir(cli.config_dir.as_deref())
            .context("failed to resolve config directory")?;
        let data_dir =
            resolve_data_dir(cli.data_dir.as_deref()).context("failed to resolve data directory")?;
        let logs_dir = data_dir.join("logs");

        let config = Arc::new(FsConfig::new(config_dir.clone()));
        let global = config
            .global_settings()
            .await
            .with_context(|| format!("failed to read settings in {}", config_dir.display()))?;

        let host = HostInfo::detect();
        let ctx = LaunchRuntimeContext::new(
            core_event_log(trace_id, cli.verbose),
            host,
            global.effective_max_workers(),
            host_inhibitor(host.os),
        );

        let ports = Collaborators {
            config,
            status: Arc::new(StdoutStatus),
            dialog: Arc::new(StderrDialog),
            save_sync: Arc::new(NoSaveSync),
            presence: Arc::new(LoggedPresence::new(trace_id)),
            title_logs: Arc::new(FileTitleLogs::new(logs_dir.clone())),
            playtime: Arc::new(JsonPlaytimeStore::new(data_dir.join("playtime.json"))),
        };

        log_event(
            trace_id,
            LogLevel::Info,
            "startup",
            "GT-CLI-010",
            "launch_context_ready",
            serde_json::json!({
                "config_dir": config_dir.to_string_lossy(),
                "data_dir": data_dir.to_string_lossy(),
                "os": host.os.as_str(),
                "os_major_version": host.os_major_version,
                "max_workers": global.effective_max_workers(),
            }),
        );

        Ok(Self {
            trace_id: trace_id.to_string(),
            orchestrator: Arc::new(LaunchOrchestrator::new(Arc::new(ctx), ports)),
            logs_dir,
        })
    }
}
