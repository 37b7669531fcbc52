use serde::{Deserialize, Serialize};

use crate::config::RuntimeKind;
use crate::error::{EnvWarning, LaunchFailure};
use crate::runtime::verifier::VerifierState;

use super::LaunchPhase;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Done,
    Error,
}

/// What `launch` hands back. A user abort is `Done` with `aborted` set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub title_id: String,
    pub status: OutcomeStatus,
    pub failure: Option<LaunchFailure>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub aborted: bool,
    /// The game process was already running for an identical launch.
    pub coalesced: bool,
    pub played_secs: u64,
    pub phases: Vec<LaunchPhase>,
}

impl LaunchOutcome {
    pub(crate) fn failed(title_id: &str, failure: LaunchFailure, phases: Vec<LaunchPhase>) -> Self {
        Self {
            title_id: title_id.to_string(),
            status: OutcomeStatus::Error,
            failure: Some(failure),
            exit_code: None,
            signal: None,
            aborted: false,
            coalesced: false,
            played_secs: 0,
            phases,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, OutcomeStatus::Done)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub failure: Option<LaunchFailure>,
}

/// Diagnostic view of a title's launch readiness.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub title_id: String,
    pub runtime: String,
    pub kind: RuntimeKind,
    pub valid: bool,
    pub reason: Option<String>,
    pub state: VerifierState,
    pub prefix_ready: Option<bool>,
    /// Redacted command line the launch would run.
    pub command: String,
    pub env_warnings: Vec<EnvWarning>,
    pub wrapper_notes: Vec<String>,
}
