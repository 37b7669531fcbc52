use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::config::{normalize_legacy_path, LaunchSettings};
use crate::env::EnvMap;
use crate::error::{FailureKind, GantryError, LaunchFailure};
use crate::observability::EventLog;
use crate::process::{ExecutionClass, ExecutionRequest, ProcessRunner};

use super::strategy_for;
use super::verifier::{CompatibilityVerifier, VerifierState};

pub const TITLES_MARKER_FILE: &str = ".gantry-titles.json";

const SPAN: &str = "prefix";

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PrefixOutcome {
    /// Native titles and runtimes without a prefix.
    NotRequired,
    AlreadyReady,
    Initialized,
}

impl CompatibilityVerifier {
    /// Makes sure the title's prefix exists and has been booted once.
    ///
    /// An existing signature file short-circuits everything, so repeated
    /// calls never start another init process. Failures come back as a
    /// structured [`LaunchFailure`].
    pub async fn ensure_prefix(
        &self,
        settings: &LaunchSettings,
        env: &EnvMap,
        runner: &ProcessRunner,
        log: &EventLog,
    ) -> Result<PrefixOutcome, LaunchFailure> {
        let Some(runtime) = settings.runtime.as_ref().filter(|r| !r.is_native()) else {
            return Ok(PrefixOutcome::NotRequired);
        };
        let title_id = settings.title_id.as_str();
        let strategy = strategy_for(runtime.kind);

        let Some(prefix) = settings.prefix_path.as_deref().map(normalize_legacy_path) else {
            return Err(LaunchFailure::configuration(
                title_id,
                format!("runtime '{}' needs a prefix directory", runtime.name),
            ));
        };
        let Some(signature) = strategy.prefix_signature(runtime, &prefix) else {
            return Ok(PrefixOutcome::NotRequired);
        };

        if path_exists(&signature).await {
            self.set_state(title_id, &runtime.name, VerifierState::PrefixReady);
            self.record_title(&prefix, title_id, log).await;
            return Ok(PrefixOutcome::AlreadyReady);
        }

        self.set_state(title_id, &runtime.name, VerifierState::PrefixMissing);
        log.info(
            SPAN,
            "GT-PF-010",
            "prefix_missing",
            json!({ "prefix": prefix, "signature": signature }),
        );

        let init_failed = |detail: String| {
            self.set_state(title_id, &runtime.name, VerifierState::PrefixMissing);
            log.error(
                SPAN,
                "GT-PF-030",
                "prefix_init_failed",
                json!({ "prefix": prefix, "detail": detail }),
            );
            LaunchFailure::new(FailureKind::PrefixInitFailed, title_id, detail)
        };

        if let Err(err) = tokio::fs::create_dir_all(&prefix).await {
            return Err(init_failed(format!(
                "cannot create prefix directory '{}': {err}",
                prefix.display()
            )));
        }

        let Some(request) = ExecutionRequest::from_argv(strategy.init_command(runtime, &prefix))
        else {
            return Err(init_failed(format!(
                "runtime '{}' has no prefix initialization command",
                runtime.name
            )));
        };

        self.set_state(title_id, &runtime.name, VerifierState::PrefixInitializing);
        log.info(
            SPAN,
            "GT-PF-020",
            "prefix_initializing",
            json!({ "prefix": prefix, "runtime": runtime.name }),
        );

        let result = runner
            .execute(
                request
                    .with_env(env.clone())
                    .with_cwd(prefix.clone())
                    .with_runtime(runtime.name.clone())
                    .with_prefix(prefix.clone())
                    .with_class(ExecutionClass::Auxiliary)
                    .for_title(title_id),
            )
            .await;

        if !result.success() {
            return Err(init_failed(format!(
                "prefix initialization {}",
                result.describe()
            )));
        }
        if !path_exists(&signature).await {
            return Err(init_failed(format!(
                "initialization finished but '{}' was not created",
                signature.display()
            )));
        }

        self.set_state(title_id, &runtime.name, VerifierState::PrefixReady);
        self.record_title(&prefix, title_id, log).await;
        log.info(SPAN, "GT-PF-040", "prefix_ready", json!({ "prefix": prefix }));
        Ok(PrefixOutcome::Initialized)
    }

    async fn record_title(&self, prefix: &Path, title_id: &str, log: &EventLog) {
        if let Err(err) = add_title_to_marker(prefix, title_id).await {
            log.warn(
                SPAN,
                "GT-PF-050",
                "prefix_marker_not_updated",
                json!({ "prefix": prefix, "error": err.to_string() }),
            );
        }
    }
}

pub fn marker_path(prefix: &Path) -> PathBuf {
    prefix.join(TITLES_MARKER_FILE)
}

/// Title ids recorded as installed into `prefix`. A missing marker reads as
/// empty; one that does not parse is an error.
pub async fn titles_in_prefix(prefix: &Path) -> Result<Vec<String>, GantryError> {
    match tokio::fs::read(marker_path(prefix)).await {
        Ok(raw) => Ok(serde_json::from_slice(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Adds `title_id` to the prefix marker. Returns whether the file changed.
/// A marker that cannot be read is left untouched.
pub async fn add_title_to_marker(prefix: &Path, title_id: &str) -> Result<bool, GantryError> {
    let mut titles = titles_in_prefix(prefix).await?;
    if titles.iter().any(|known| known == title_id) {
        return Ok(false);
    }

    titles.push(title_id.to_string());
    let raw = serde_json::to_vec_pretty(&titles)?;
    tokio::fs::write(marker_path(prefix), raw).await?;
    Ok(true)
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
