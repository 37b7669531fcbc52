use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::observability::EventLog;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchPhase {
    Idle,
    PreparingCommon,
    /// Skipped for native titles.
    PreparingRuntime,
    ReadyToSpawn,
    Running,
    CleaningUp,
    Done,
    Failed,
}

impl LaunchPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PreparingCommon => "preparing-common",
            Self::PreparingRuntime => "preparing-runtime",
            Self::ReadyToSpawn => "ready-to-spawn",
            Self::Running => "running",
            Self::CleaningUp => "cleaning-up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Records the phases one launch went through and logs every transition.
pub(crate) struct PhaseTrace {
    log: EventLog,
    phases: Vec<LaunchPhase>,
}

impl PhaseTrace {
    pub(crate) fn new(log: EventLog) -> Self {
        Self {
            log,
            phases: vec![LaunchPhase::Idle],
        }
    }

    pub(crate) fn current(&self) -> LaunchPhase {
        self.phases.last().copied().unwrap_or(LaunchPhase::Idle)
    }

    pub(crate) fn enter(&mut self, next: LaunchPhase) {
        let from = self.current();
        debug_assert!(
            next > from,
            "launch phases must advance: {} -> {}",
            from.as_str(),
            next.as_str()
        );

        self.log.info(
            "launch",
            "GT-LN-001",
            "launch_phase_entered",
            json!({ "from": from.as_str(), "to": next.as_str() }),
        );
        self.phases.push(next);
    }

    pub(crate) fn into_phases(self) -> Vec<LaunchPhase> {
        self.phases
    }
}
