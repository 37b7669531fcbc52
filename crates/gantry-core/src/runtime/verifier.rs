use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RuntimeDescriptor;
use crate::observability::EventLog;
use crate::platform::HostInfo;

use super::strategy_for;

/// Lifecycle of one (title, runtime) pair.
///
/// `Unverified -> Validating -> {Valid, Invalid}`, then for runtimes with a
/// prefix `Valid -> PrefixMissing -> PrefixInitializing -> PrefixReady`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VerifierState {
    #[default]
    Unverified,
    Validating,
    Valid,
    Invalid,
    PrefixMissing,
    PrefixInitializing,
    PrefixReady,
}

pub struct CompatibilityVerifier {
    host: HostInfo,
    states: Mutex<HashMap<(String, String), VerifierState>>,
}

impl CompatibilityVerifier {
    pub fn new(host: HostInfo) -> Self {
        Self {
            host,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    pub fn state(&self, title_id: &str, runtime_name: &str) -> VerifierState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(title_id.to_string(), runtime_name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_state(&self, title_id: &str, runtime_name: &str, state: VerifierState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((title_id.to_string(), runtime_name.to_string()), state);
    }

    /// Returns whether the runtime is usable on this host. Never fails; the
    /// reason for a negative answer is logged.
    pub fn validate(&self, title_id: &str, runtime: &RuntimeDescriptor, log: &EventLog) -> bool {
        self.check(title_id, runtime, log).is_ok()
    }

    /// Like [`Self::validate`], keeping the reason for callers that report it.
    pub fn check(
        &self,
        title_id: &str,
        runtime: &RuntimeDescriptor,
        log: &EventLog,
    ) -> Result<(), String> {
        self.set_state(title_id, &runtime.name, VerifierState::Validating);

        let outcome = strategy_for(runtime.kind).validate(runtime, &self.host);
        match &outcome {
            Ok(()) => {
                self.set_state(title_id, &runtime.name, VerifierState::Valid);
                log.info(
                    "verifier",
                    "GT-RT-010",
                    "runtime_valid",
                    json!({ "runtime": runtime.name, "kind": runtime.kind }),
                );
            }
            Err(reason) => {
                self.set_state(title_id, &runtime.name, VerifierState::Invalid);
                log.warn(
                    "verifier",
                    "GT-RT-020",
                    "runtime_invalid",
                    json!({
                        "runtime": runtime.name,
                        "kind": runtime.kind,
                        "reason": reason,
                        "os": self.host.os,
                    }),
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::config::{LayerFlavor, RuntimeKind};
    use crate::observability::MemoryEventSink;
    use crate::platform::HostOs;
    use crate::test_support::TestDir;

    #[test]
    fn validate_tracks_state_and_logs_reason() {
        let events = Arc::new(MemoryEventSink::default());
        let log = EventLog::new(events.clone(), "trace");
        let verifier = CompatibilityVerifier::new(HostInfo::new(HostOs::Linux, None));
        let dir = TestDir::new("verifier");

        let mut runtime = RuntimeDescriptor {
            kind: RuntimeKind::TranslationLayer,
            flavor: LayerFlavor::Proton,
            name: "GE-Proton9".to_string(),
            binary: PathBuf::from("/nonexistent/proton"),
            server: None,
            lib32: None,
            lib64: None,
        };

        assert_eq!(verifier.state("celeste", "GE-Proton9"), VerifierState::Unverified);
        assert!(!verifier.validate("celeste", &runtime, &log));
        assert_eq!(verifier.state("celeste", "GE-Proton9"), VerifierState::Invalid);
        assert!(events.codes().contains(&"GT-RT-020".to_string()));

        runtime.binary = dir.touch("proton");
        assert!(verifier.validate("celeste", &runtime, &log));
        assert_eq!(verifier.state("celeste", "GE-Proton9"), VerifierState::Valid);
    }

    #[test]
    fn native_runtime_is_always_valid() {
        let log = EventLog::new(Arc::new(MemoryEventSink::default()), "trace");
        let verifier = CompatibilityVerifier::new(HostInfo::new(HostOs::Windows, None));
        assert!(verifier.validate("celeste", &RuntimeDescriptor::native(), &log));
    }
}
