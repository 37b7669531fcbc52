#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod inhibitor;
pub mod launch;
pub mod observability;
pub mod platform;
pub mod playtime;
pub mod ports;
pub mod process;
pub mod runtime;
pub mod wrappers;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use context::LaunchRuntimeContext;
pub use error::{FailureKind, GantryError, LaunchFailure};
pub use launch::{
    Collaborators, CommandOutput, LaunchOrchestrator, LaunchOutcome, LaunchPhase, OutcomeStatus,
    ValidationReport,
};
pub use process::{ExecutionRequest, ExecutionResult, ProcessRunner};
