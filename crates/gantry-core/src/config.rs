use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GantryError;

pub const DEFAULT_MAX_WORKERS: usize = 2;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    TranslationLayer,
    BottleManager,
    Toolkit,
    Native,
}

impl RuntimeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TranslationLayer => "translation-layer",
            Self::BottleManager => "bottle-manager",
            Self::Toolkit => "toolkit",
            Self::Native => "native",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayerFlavor {
    #[default]
    Wine,
    Proton,
}

/// A compatibility runtime as produced by discovery; read-only here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub kind: RuntimeKind,
    #[serde(default)]
    pub flavor: LayerFlavor,
    pub name: String,
    #[serde(default)]
    pub binary: PathBuf,
    #[serde(default)]
    pub server: Option<PathBuf>,
    #[serde(default)]
    pub lib32: Option<PathBuf>,
    #[serde(default)]
    pub lib64: Option<PathBuf>,
}

impl RuntimeDescriptor {
    pub fn native() -> Self {
        Self {
            kind: RuntimeKind::Native,
            flavor: LayerFlavor::Wine,
            name: "native".to_string(),
            binary: PathBuf::new(),
            server: None,
            lib32: None,
            lib64: None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, RuntimeKind::Native)
    }

    pub fn is_proton(&self) -> bool {
        matches!(self.kind, RuntimeKind::TranslationLayer)
            && matches!(self.flavor, LayerFlavor::Proton)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPrimitive {
    #[default]
    None,
    Esync,
    Fsync,
    Msync,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureToggles {
    pub sync_primitive: SyncPrimitive,
    pub show_fps: bool,
    pub frame_limit: Option<u32>,
    pub fsr: bool,
    pub fsr_sharpness: Option<u8>,
    pub dxvk_nvapi: bool,
    pub prime_offload: bool,
    pub advertise_avx: bool,
    pub verbose_logs: bool,
    pub prefer_system_libs: bool,
    pub eac_runtime: Option<PathBuf>,
    pub battleye_runtime: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WindowType {
    #[default]
    Fullscreen,
    Borderless,
    Windowed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CompositorSettings {
    pub enabled: bool,
    pub game_width: Option<u32>,
    pub game_height: Option<u32>,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub upscale_method: String,
    pub window_type: WindowType,
    pub fps_limit: Option<u32>,
    pub fps_limit_no_focus: Option<u32>,
    pub force_grab_cursor: bool,
    pub additional_options: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CustomWrapper {
    pub executable: String,
    #[serde(default)]
    pub args: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct WrapperSettings {
    pub compositor: CompositorSettings,
    pub overlay: bool,
    pub scheduler_hint: bool,
    pub sandbox_runtime: bool,
    pub custom: Vec<CustomWrapper>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptsConfig {
    pub pre_launch: String,
    pub post_launch: String,
    pub pre_launch_fatal: bool,
}

/// Immutable per-launch snapshot of a title's settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub title_id: String,
    #[serde(default)]
    pub display_name: String,
    pub install_path: PathBuf,
    pub executable: String,
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub runtime: Option<RuntimeDescriptor>,
    #[serde(default)]
    pub prefix_path: Option<PathBuf>,
    #[serde(default)]
    pub env_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub wrappers: WrapperSettings,
    #[serde(default)]
    pub features: FeatureToggles,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub sync_saves: bool,
}

impl LaunchSettings {
    pub fn runtime_kind(&self) -> RuntimeKind {
        self.runtime
            .as_ref()
            .map_or(RuntimeKind::Native, |runtime| runtime.kind)
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime
            .as_ref()
            .map_or("native", |runtime| runtime.name.as_str())
    }

    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.title_id
        } else {
            &self.display_name
        }
    }

    /// Absolute path of the title's main binary.
    pub fn executable_path(&self) -> PathBuf {
        let executable = normalize_legacy_path(Path::new(&self.executable));
        if executable.is_absolute() {
            executable
        } else {
            normalize_legacy_path(&self.install_path).join(executable)
        }
    }

    /// Fills the runtime and prefix from global defaults, leaving explicit
    /// per-title values untouched.
    pub fn with_defaults(mut self, global: &GlobalSettings) -> Self {
        if self.runtime.is_none() {
            self.runtime = global.default_runtime.clone();
        }

        let needs_prefix = self
            .runtime
            .as_ref()
            .is_some_and(|runtime| !runtime.is_native());
        if needs_prefix && self.prefix_path.is_none() {
            self.prefix_path = global
                .prefixes_dir
                .as_ref()
                .map(|dir| dir.join(sanitize_dir_name(&self.title_id)));
        }

        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPaths {
    pub gamescope: Option<PathBuf>,
    pub mangohud: Option<PathBuf>,
    pub gamemoderun: Option<PathBuf>,
    pub steam_runtime: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalSettings {
    pub max_workers: usize,
    pub presence_enabled: bool,
    pub default_runtime: Option<RuntimeDescriptor>,
    pub prefixes_dir: Option<PathBuf>,
    pub prevent_display_sleep: bool,
    pub tools: ToolPaths,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            presence_enabled: false,
            default_runtime: None,
            prefixes_dir: None,
            prevent_display_sleep: true,
            tools: ToolPaths::default(),
        }
    }
}

impl GlobalSettings {
    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.max(1)
    }
}

pub fn default_prefixes_dir() -> Result<PathBuf, GantryError> {
    let home = env::var_os("HOME").ok_or(GantryError::MissingHomeDir)?;
    Ok(PathBuf::from(home).join(".local/share/gantry/prefixes"))
}

/// Older settings files stored paths wrapped in stray quotes, e.g.
/// `"'/games/prefix'"`. Strips any mix of surrounding quote characters and
/// leaves every other byte of the path alone.
#[cfg(unix)]
pub fn normalize_legacy_path(path: &Path) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let trimmed = trim_legacy_quotes(path.as_os_str().as_bytes());
    PathBuf::from(OsStr::from_bytes(trimmed))
}

#[cfg(not(unix))]
pub fn normalize_legacy_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => {
            let trimmed = trim_legacy_quotes(raw.as_bytes());
            // Only ASCII bytes are trimmed, so the remainder is still UTF-8.
            PathBuf::from(String::from_utf8_lossy(trimmed).into_owned())
        }
        None => path.to_path_buf(),
    }
}

fn trim_legacy_quotes(raw: &[u8]) -> &[u8] {
    let is_quote = |byte: &u8| *byte == b'\'' || *byte == b'"';
    let raw = raw.trim_ascii();
    let start = raw.iter().position(|b| !is_quote(b)).unwrap_or(raw.len());
    let end = raw.iter().rposition(|b| !is_quote(b)).map_or(start, |i| i + 1);
    raw[start..end].trim_ascii()
}

fn sanitize_dir_name(raw: &str) -> String {
    let cleaned = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

const fn default_true() -> bool {
    true
}
