//! Seams to the collaborators that live outside the launch subsystem.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GlobalSettings, LaunchSettings};
use crate::error::{GantryError, LaunchFailure};
use crate::playtime::PlaytimeRecord;

#[async_trait]
pub trait ConfigurationPort: Send + Sync {
    async fn title_settings(&self, title_id: &str) -> Result<LaunchSettings, GantryError>;

    async fn global_settings(&self) -> Result<GlobalSettings, GantryError>;
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchStatus {
    Launching,
    Playing,
    SyncingSaves,
    Done,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Progress {
    pub step: String,
    pub percent: Option<u8>,
}

pub trait StatusBroadcaster: Send + Sync {
    fn send_status(
        &self,
        title_id: &str,
        runner: &str,
        status: LaunchStatus,
        progress: Option<&Progress>,
    );
}

pub trait DialogPort: Send + Sync {
    fn show_failure(&self, failure: &LaunchFailure);
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Download,
    Upload,
}

#[async_trait]
pub trait SaveSyncPort: Send + Sync {
    async fn sync(&self, settings: &LaunchSettings, direction: SyncDirection)
        -> Result<(), String>;
}

pub trait PresencePort: Send + Sync {
    fn set_playing(&self, title_id: &str, label: &str);

    fn clear(&self, title_id: &str);
}

/// Per-title rolling log that receives command echoes and live output.
pub trait TitleLog: Send + Sync {
    fn write_string(&self, text: &str);

    fn log_info(&self, message: &str);

    fn log_error(&self, message: &str);

    fn close(&self);
}

pub trait TitleLogFactory: Send + Sync {
    fn open(&self, title_id: &str) -> std::sync::Arc<dyn TitleLog>;
}

/// Key-value store holding one playtime record per title.
pub trait PlaytimeStore: Send + Sync {
    fn load(&self, title_id: &str) -> Result<Option<PlaytimeRecord>, GantryError>;

    fn save(&self, title_id: &str, record: &PlaytimeRecord) -> Result<(), GantryError>;
}

/// Process-wide "keep the display awake" switch.
pub trait DisplayInhibitor: Send + Sync {
    fn inhibit(&self) -> Result<(), String>;

    fn uninhibit(&self);
}
