use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

pub const GLOBAL_SETTINGS_FILE: &str = "global.json";
pub const TITLES_DIR: &str = "titles";

/// `--config-dir`, else `$XDG_CONFIG_HOME/gantry`, else `~/.config/gantry`.
pub fn resolve_config_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    resolve_dir(explicit, "XDG_CONFIG_HOME", ".config")
}

/// `--data-dir`, else `$XDG_DATA_HOME/gantry`, else `~/.local/share/gantry`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    resolve_dir(explicit, "XDG_DATA_HOME", ".local/share")
}

/// Rejects ids that would escape the titles directory.
pub fn validate_title_id(title_id: &str) -> anyhow::Result<&str> {
    let trimmed = title_id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("title id is empty"));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(anyhow!("title id is not a plain name: {title_id}"));
    }
    Ok(trimmed)
}

fn resolve_dir(explicit: Option<&Path>, xdg_var: &str, home_rel: &str) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    if let Some(base) = env::var_os(xdg_var).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(base).join("gantry"));
    }

    let home = env::var_os("HOME").context("HOME is not set and no directory was given")?;
    Ok(PathBuf::from(home).join(home_rel).join("gantry"))
}
