pub mod rules;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{normalize_legacy_path, LaunchSettings, RuntimeDescriptor};
use crate::error::EnvWarning;
use crate::platform::HostOs;

pub type EnvMap = BTreeMap<String, String>;

/// Inputs every environment rule can look at.
pub struct RuleContext<'a> {
    pub settings: &'a LaunchSettings,
    pub runtime: &'a RuntimeDescriptor,
    pub os: HostOs,
    pub prefix: Option<PathBuf>,
}

impl RuleContext<'_> {
    pub fn is_native(&self) -> bool {
        self.runtime.is_native()
    }
}

/// Mutable environment under construction. Rules write here; user overrides
/// are layered on top by [`compose_environment`].
pub struct EnvDraft<'a> {
    vars: EnvMap,
    warnings: Vec<EnvWarning>,
    user: &'a EnvMap,
}

impl<'a> EnvDraft<'a> {
    fn new(user: &'a EnvMap) -> Self {
        Self {
            vars: EnvMap::new(),
            warnings: Vec::new(),
            user,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Sets `key` unless a rule or the user already defined that exact key.
    pub fn set_default(&mut self, key: &str, value: impl Into<String>) {
        if self.user.contains_key(key) || self.vars.contains_key(key) {
            return;
        }
        self.vars.insert(key.to_string(), value.into());
    }

    /// Sets `key` to `path` only when the path exists; warns otherwise.
    pub fn set_existing_path(&mut self, rule: &str, key: &str, path: &Path) -> bool {
        if path.exists() {
            self.set(key, path.to_string_lossy().into_owned());
            return true;
        }

        self.warn(
            rule,
            format!("{key} skipped: '{}' does not exist", path.display()),
        );
        false
    }

    pub fn warn(&mut self, rule: &str, message: impl Into<String>) {
        self.warnings.push(EnvWarning::new(rule, message));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnvComposition {
    pub vars: EnvMap,
    pub warnings: Vec<EnvWarning>,
}

/// Maps launch settings, host OS and runtime kind to a flat environment.
///
/// Never fails: unsupported combinations leave the environment untouched and
/// add a warning. User overrides always win; a composed key that differs from
/// a user key only by case is dropped and reported.
pub fn compose_environment(settings: &LaunchSettings, os: HostOs) -> EnvComposition {
    let native = RuntimeDescriptor::native();
    let runtime = settings.runtime.as_ref().unwrap_or(&native);
    let ctx = RuleContext {
        settings,
        runtime,
        os,
        prefix: settings
            .prefix_path
            .as_deref()
            .map(normalize_legacy_path),
    };

    let mut draft = EnvDraft::new(&settings.env_overrides);
    for rule in rules::RULES {
        if (rule.applies)(&ctx) {
            (rule.apply)(&ctx, &mut draft);
        }
    }

    layer_user_overrides(draft)
}

fn layer_user_overrides(draft: EnvDraft<'_>) -> EnvComposition {
    let EnvDraft {
        mut vars,
        mut warnings,
        user,
    } = draft;

    for (user_key, user_value) in user {
        let shadowed = vars
            .keys()
            .filter(|key| *key != user_key && key.eq_ignore_ascii_case(user_key))
            .cloned()
            .collect::<Vec<_>>();

        for key in shadowed {
            vars.remove(&key);
            warnings.push(EnvWarning::new(
                "user-overrides",
                format!("user variable '{user_key}' shadows composed variable '{key}'"),
            ));
        }

        vars.insert(user_key.clone(), user_value.clone());
    }

    EnvComposition { vars, warnings }
}
