use async_trait::async_trait;
use gantry_core::config::LaunchSettings;
use gantry_core::ports::{SaveSyncPort, SyncDirection};

/// Used when no cloud-save backend is wired in.
pub struct NoSaveSync;

#[async_trait]
impl SaveSyncPort for NoSaveSync {
    async fn sync(&self, settings: &LaunchSettings, direction: SyncDirection) -> Result<(), String> {
        Err(format!(
            "no save-sync backend configured for {} ({direction:?} skipped)",
            settings.title_id
        ))
    }
}
