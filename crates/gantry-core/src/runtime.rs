pub mod prefix;
pub mod verifier;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::{normalize_legacy_path, LayerFlavor, RuntimeDescriptor, RuntimeKind};
use crate::env::{EnvDraft, RuleContext};
use crate::platform::{HostInfo, HostOs};

pub const TOOLKIT_MIN_MACOS_MAJOR: u32 = 14;

/// How a command is handed to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerb {
    /// Start the title and keep the runtime alive until it exits.
    Launch,
    /// Run an auxiliary tool inside the title's prefix.
    Run,
}

/// Behaviour that differs per runtime kind. One implementation per kind.
pub trait RuntimeStrategy: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    fn env_contribution(&self, ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>);

    /// Returns the reason the runtime is unusable, if any.
    fn validate(&self, runtime: &RuntimeDescriptor, host: &HostInfo) -> Result<(), String>;

    /// File whose presence proves the prefix was booted at least once.
    /// `None` when the runtime has no prefix.
    fn prefix_signature(&self, runtime: &RuntimeDescriptor, prefix: &Path) -> Option<PathBuf>;

    /// Tokens placed before the title binary or tool argv.
    fn command_prefix(
        &self,
        runtime: &RuntimeDescriptor,
        prefix: Option<&Path>,
        verb: RunVerb,
    ) -> Vec<String>;

    fn init_command(&self, runtime: &RuntimeDescriptor, prefix: &Path) -> Vec<String> {
        let mut argv = self.command_prefix(runtime, Some(prefix), RunVerb::Run);
        argv.push("wineboot".to_string());
        argv.push("--init".to_string());
        argv
    }
}

pub fn strategy_for(kind: RuntimeKind) -> &'static dyn RuntimeStrategy {
    match kind {
        RuntimeKind::TranslationLayer => &TranslationLayerStrategy,
        RuntimeKind::BottleManager => &BottleManagerStrategy,
        RuntimeKind::Toolkit => &ToolkitStrategy,
        RuntimeKind::Native => &NativeStrategy,
    }
}

pub struct TranslationLayerStrategy;

impl RuntimeStrategy for TranslationLayerStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::TranslationLayer
    }

    fn env_contribution(&self, ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
        let runtime = ctx.runtime;

        match runtime.flavor {
            LayerFlavor::Wine => {
                if let Some(prefix) = &ctx.prefix {
                    draft.set("WINEPREFIX", path_to_string(prefix));
                }
                if let Some(server) = &runtime.server {
                    draft.set_existing_path(
                        "runtime",
                        "WINESERVER",
                        &normalize_legacy_path(server),
                    );
                }
                if !ctx.settings.features.prefer_system_libs {
                    apply_companion_library_paths(runtime, draft);
                }
                if ctx.settings.features.dxvk_nvapi {
                    draft.set("DXVK_ENABLE_NVAPI", "1");
                    draft.set("DXVK_NVAPI_ALLOW_OTHER_DRIVERS", "1");
                }
            }
            LayerFlavor::Proton => {
                if let Some(prefix) = &ctx.prefix {
                    draft.set("STEAM_COMPAT_DATA_PATH", path_to_string(prefix));
                }
                draft.set(
                    "STEAM_COMPAT_INSTALL_PATH",
                    path_to_string(&normalize_legacy_path(&ctx.settings.install_path)),
                );
                draft.set("STEAM_COMPAT_APP_ID", "0");
                draft.set("SteamAppId", "0");
                draft.set("SteamGameId", format!("gantry-{}", ctx.settings.title_id));
                if ctx.settings.features.dxvk_nvapi {
                    draft.set("PROTON_ENABLE_NVAPI", "1");
                    draft.set("DXVK_NVAPI_ALLOW_OTHER_DRIVERS", "1");
                }
                if let Some(path) = &ctx.settings.features.eac_runtime {
                    draft.set_existing_path(
                        "anti-cheat",
                        "PROTON_EAC_RUNTIME",
                        &normalize_legacy_path(path),
                    );
                }
                if let Some(path) = &ctx.settings.features.battleye_runtime {
                    draft.set_existing_path(
                        "anti-cheat",
                        "PROTON_BATTLEYE_RUNTIME",
                        &normalize_legacy_path(path),
                    );
                }
            }
        }
    }

    fn validate(&self, runtime: &RuntimeDescriptor, _host: &HostInfo) -> Result<(), String> {
        require_binary(runtime)?;

        match (&runtime.server, runtime.flavor) {
            (Some(server), _) => {
                let server = normalize_legacy_path(server);
                if server.is_file() {
                    Ok(())
                } else {
                    Err(format!("server binary '{}' does not exist", server.display()))
                }
            }
            (None, LayerFlavor::Wine) => {
                Err("wine runtime does not declare a server binary".to_string())
            }
            (None, LayerFlavor::Proton) => Ok(()),
        }
    }

    fn prefix_signature(&self, runtime: &RuntimeDescriptor, prefix: &Path) -> Option<PathBuf> {
        match runtime.flavor {
            LayerFlavor::Wine => Some(prefix.join("system.reg")),
            LayerFlavor::Proton => Some(prefix.join("pfx").join("system.reg")),
        }
    }

    fn command_prefix(
        &self,
        runtime: &RuntimeDescriptor,
        _prefix: Option<&Path>,
        verb: RunVerb,
    ) -> Vec<String> {
        let mut tokens = vec![binary_string(runtime)];
        if matches!(runtime.flavor, LayerFlavor::Proton) {
            tokens.push(
                match verb {
                    RunVerb::Launch => "waitforexitandrun",
                    RunVerb::Run => "run",
                }
                .to_string(),
            );
        }
        tokens
    }
}

pub struct BottleManagerStrategy;

impl RuntimeStrategy for BottleManagerStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::BottleManager
    }

    fn env_contribution(&self, ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
        let Some(prefix) = &ctx.prefix else {
            draft.warn("runtime", "bottle manager runtime has no bottle directory configured");
            return;
        };

        if let Some(name) = bottle_name(prefix) {
            draft.set("CX_BOTTLE", name);
        }
        if let Some(parent) = prefix.parent() {
            draft.set("CX_BOTTLE_PATH", path_to_string(parent));
        }
    }

    fn validate(&self, runtime: &RuntimeDescriptor, _host: &HostInfo) -> Result<(), String> {
        require_binary(runtime)
    }

    fn prefix_signature(&self, _runtime: &RuntimeDescriptor, prefix: &Path) -> Option<PathBuf> {
        Some(prefix.join("cxbottle.conf"))
    }

    fn command_prefix(
        &self,
        runtime: &RuntimeDescriptor,
        prefix: Option<&Path>,
        _verb: RunVerb,
    ) -> Vec<String> {
        let mut tokens = vec![binary_string(runtime)];
        if let Some(name) = prefix.and_then(bottle_name) {
            tokens.push("--bottle".to_string());
            tokens.push(name);
        }
        tokens
    }
}

pub struct ToolkitStrategy;

impl RuntimeStrategy for ToolkitStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Toolkit
    }

    fn env_contribution(&self, ctx: &RuleContext<'_>, draft: &mut EnvDraft<'_>) {
        if let Some(prefix) = &ctx.prefix {
            draft.set("WINEPREFIX", path_to_string(prefix));
        }
    }

    fn validate(&self, runtime: &RuntimeDescriptor, host: &HostInfo) -> Result<(), String> {
        if !matches!(host.os, HostOs::MacOs) {
            return Err(format!("toolkit runtime is not supported on {}", host.os.as_str()));
        }

        match host.os_major_version {
            Some(major) if major >= TOOLKIT_MIN_MACOS_MAJOR => {}
            Some(major) => {
                return Err(format!(
                    "toolkit runtime requires macOS {TOOLKIT_MIN_MACOS_MAJOR} or newer (found {major})"
                ))
            }
            None => return Err("unable to determine macOS version".to_string()),
        }

        require_binary(runtime)
    }

    fn prefix_signature(&self, _runtime: &RuntimeDescriptor, prefix: &Path) -> Option<PathBuf> {
        Some(prefix.join("system.reg"))
    }

    fn command_prefix(
        &self,
        runtime: &RuntimeDescriptor,
        _prefix: Option<&Path>,
        _verb: RunVerb,
    ) -> Vec<String> {
        vec![binary_string(runtime)]
    }
}

pub struct NativeStrategy;

impl RuntimeStrategy for NativeStrategy {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Native
    }

    fn env_contribution(&self, _ctx: &RuleContext<'_>, _draft: &mut EnvDraft<'_>) {}

    fn validate(&self, _runtime: &RuntimeDescriptor, _host: &HostInfo) -> Result<(), String> {
        Ok(())
    }

    fn prefix_signature(&self, _runtime: &RuntimeDescriptor, _prefix: &Path) -> Option<PathBuf> {
        None
    }

    fn command_prefix(
        &self,
        _runtime: &RuntimeDescriptor,
        _prefix: Option<&Path>,
        _verb: RunVerb,
    ) -> Vec<String> {
        Vec::new()
    }

    fn init_command(&self, _runtime: &RuntimeDescriptor, _prefix: &Path) -> Vec<String> {
        Vec::new()
    }
}

fn apply_companion_library_paths(runtime: &RuntimeDescriptor, draft: &mut EnvDraft<'_>) {
    let mut lib_dirs = Vec::new();
    for dir in [&runtime.lib32, &runtime.lib64].into_iter().flatten() {
        let dir = normalize_legacy_path(dir);
        if dir.is_dir() {
            lib_dirs.push(dir);
        } else {
            draft.warn(
                "library-paths",
                format!("runtime library directory '{}' does not exist; skipped", dir.display()),
            );
        }
    }

    if lib_dirs.is_empty() {
        return;
    }

    let inherited = std::env::var_os("LD_LIBRARY_PATH");
    draft.set(
        "LD_LIBRARY_PATH",
        prepend_search_path(&lib_dirs, inherited.as_deref()),
    );

    let dll_dirs = lib_dirs.iter().map(|dir| dir.join("wine")).filter(|dir| dir.is_dir());
    let dll_path = join_existing(dll_dirs);
    if !dll_path.is_empty() {
        draft.set("WINEDLLPATH", dll_path);
    }

    let gst_dirs = lib_dirs
        .iter()
        .map(|dir| dir.join("gstreamer-1.0"))
        .filter(|dir| dir.is_dir());
    let gst_path = join_existing(gst_dirs);
    if !gst_path.is_empty() {
        draft.set("GST_PLUGIN_SYSTEM_PATH_1_0", gst_path);
    }
}

/// `dirs` ahead of the entries of an inherited search path, duplicates and
/// empty entries dropped.
fn prepend_search_path(dirs: &[PathBuf], inherited: Option<&OsStr>) -> String {
    let mut entries = dirs.to_vec();
    for entry in inherited.map(std::env::split_paths).into_iter().flatten() {
        if !entry.as_os_str().is_empty() && !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    join_existing(entries.into_iter())
}

fn join_existing(dirs: impl Iterator<Item = PathBuf>) -> String {
    dirs.map(|dir| path_to_string(&dir))
        .collect::<Vec<_>>()
        .join(":")
}

fn require_binary(runtime: &RuntimeDescriptor) -> Result<(), String> {
    let binary = normalize_legacy_path(&runtime.binary);
    if binary.as_os_str().is_empty() {
        return Err(format!("runtime '{}' has no binary path", runtime.name));
    }
    if !binary.is_file() {
        return Err(format!("runtime binary '{}' does not exist", binary.display()));
    }
    Ok(())
}

fn binary_string(runtime: &RuntimeDescriptor) -> String {
    path_to_string(&normalize_legacy_path(&runtime.binary))
}

fn bottle_name(prefix: &Path) -> Option<String> {
    prefix
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

pub(crate) fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
