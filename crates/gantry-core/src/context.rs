use std::sync::Arc;

use crate::inhibitor::SharedInhibitor;
use crate::observability::EventLog;
use crate::platform::HostInfo;
use crate::ports::DisplayInhibitor;
use crate::process::ProcessRunner;
use crate::runtime::verifier::CompatibilityVerifier;

/// Process-wide launch state: the in-flight and abort registries (inside the
/// runner), verifier states and the display-sleep inhibitor.
///
/// Owned by the composition root and shared by reference; nothing here is a
/// global, so tests get a fresh context each.
pub struct LaunchRuntimeContext {
    pub log: EventLog,
    pub runner: ProcessRunner,
    pub verifier: CompatibilityVerifier,
    pub inhibitor: SharedInhibitor,
}

impl LaunchRuntimeContext {
    pub fn new(
        log: EventLog,
        host: HostInfo,
        max_workers: usize,
        inhibitor: Arc<dyn DisplayInhibitor>,
    ) -> Self {
        Self {
            runner: ProcessRunner::new(log.clone(), max_workers),
            verifier: CompatibilityVerifier::new(host),
            inhibitor: SharedInhibitor::new(inhibitor),
            log,
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }
}
