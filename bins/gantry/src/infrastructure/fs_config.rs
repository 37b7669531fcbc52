use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use gantry_core::config::{default_prefixes_dir, GlobalSettings, LaunchSettings};
use gantry_core::ports::ConfigurationPort;
use gantry_core::GantryError;

use super::paths::{validate_title_id, GLOBAL_SETTINGS_FILE, TITLES_DIR};

/// Reads `global.json` and `titles/<id>.json` from the config directory.
pub struct FsConfig {
    dir: PathBuf,
}

impl FsConfig {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn title_path(&self, title_id: &str) -> Result<PathBuf, GantryError> {
        let title_id = validate_title_id(title_id)
            .map_err(|err| GantryError::InvalidSettings(err.to_string()))?;
        Ok(self.dir.join(TITLES_DIR).join(format!("{title_id}.json")))
    }
}

#[async_trait]
impl ConfigurationPort for FsConfig {
    async fn title_settings(&self, title_id: &str) -> Result<LaunchSettings, GantryError> {
        let path = self.title_path(title_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(GantryError::UnknownTitle(title_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut settings: LaunchSettings = serde_json::from_str(&raw)?;
        if settings.title_id.trim().is_empty() {
            settings.title_id = title_id.to_string();
        } else if settings.title_id != title_id {
            return Err(GantryError::InvalidSettings(format!(
                "{} declares title '{}' but was loaded as '{title_id}'",
                path.display(),
                settings.title_id
            )));
        }
        Ok(settings)
    }

    async fn global_settings(&self) -> Result<GlobalSettings, GantryError> {
        let path = self.dir.join(GLOBAL_SETTINGS_FILE);
        let mut global = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<GlobalSettings>(&raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => GlobalSettings::default(),
            Err(err) => return Err(err.into()),
        };

        if global.prefixes_dir.is_none() {
            global.prefixes_dir = default_prefixes_dir().ok();
        }
        Ok(global)
    }
}
