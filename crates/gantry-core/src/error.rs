use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GantryError {
    #[error("home directory is not available in environment")]
    MissingHomeDir,

    #[error("no settings found for title '{0}'")]
    UnknownTitle(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Closed set of reasons a launch or command can fail.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ConfigurationInvalid,
    PrefixInitFailed,
    ProcessSpawnFailed,
    ProcessCrashed,
    UserAborted,
    ScriptFailed,
}

impl FailureKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationInvalid => "LAUNCH_CONFIGURATION_INVALID",
            Self::PrefixInitFailed => "LAUNCH_PREFIX_INIT_FAILED",
            Self::ProcessSpawnFailed => "LAUNCH_SPAWN_FAILED",
            Self::ProcessCrashed => "LAUNCH_PROCESS_CRASHED",
            Self::UserAborted => "LAUNCH_USER_ABORTED",
            Self::ScriptFailed => "LAUNCH_SCRIPT_FAILED",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigurationInvalid => "launch configuration is invalid",
            Self::PrefixInitFailed => "compatibility prefix could not be initialized",
            Self::ProcessSpawnFailed => "process could not be started",
            Self::ProcessCrashed => "process exited abnormally",
            Self::UserAborted => "launch was stopped by the user",
            Self::ScriptFailed => "launch script failed",
        }
    }

    /// Failures that are shown to the user through the dialog collaborator.
    pub const fn is_user_facing(self) -> bool {
        matches!(self, Self::ConfigurationInvalid | Self::PrefixInitFailed)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Structured, human-readable failure returned to callers instead of a panic
/// or an opaque error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Error)]
#[error("{kind} [{title_id}]: {}: {detail}", .kind.message())]
pub struct LaunchFailure {
    pub kind: FailureKind,
    pub title_id: String,
    pub detail: String,
}

impl LaunchFailure {
    pub fn new(kind: FailureKind, title_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            title_id: title_id.into(),
            detail: detail.into(),
        }
    }

    pub fn configuration(title_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ConfigurationInvalid, title_id, detail)
    }
}

/// Non-fatal finding produced while composing a launch environment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EnvWarning {
    pub rule: String,
    pub message: String,
}

impl EnvWarning {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failure_display_carries_code_title_and_detail() {
        let failure = LaunchFailure::new(
            FailureKind::PrefixInitFailed,
            "celeste",
            "wineboot exited with code 1",
        );

        let rendered = failure.to_string();
        assert!(rendered.starts_with("LAUNCH_PREFIX_INIT_FAILED [celeste]"));
        assert!(rendered.ends_with("wineboot exited with code 1"));
    }

    #[test]
    fn only_configuration_and_prefix_failures_are_user_facing() {
        assert!(FailureKind::ConfigurationInvalid.is_user_facing());
        assert!(FailureKind::PrefixInitFailed.is_user_facing());
        assert!(!FailureKind::ProcessCrashed.is_user_facing());
        assert!(!FailureKind::UserAborted.is_user_facing());
    }

    #[test]
    fn failure_kind_serializes_kebab_case() {
        let raw = serde_json::to_string(&FailureKind::ProcessSpawnFailed).expect("serialize");
        assert_eq!(raw, "\"process-spawn-failed\"");
    }
}
