use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::config::{GlobalSettings, LaunchSettings, RuntimeDescriptor};
use crate::error::{GantryError, LaunchFailure};
use crate::playtime::PlaytimeRecord;
use crate::ports::{
    ConfigurationPort, DialogPort, DisplayInhibitor, LaunchStatus, PlaytimeStore, PresencePort,
    Progress, SaveSyncPort, StatusBroadcaster, SyncDirection, TitleLog, TitleLogFactory,
};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Unique directory under the system temp dir, removed on drop.
pub struct TestDir(PathBuf);

impl TestDir {
    pub fn new(label: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_millis();
        let seq = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "gantry-{label}-{}-{millis}-{seq}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("create temp dir");
        Self(root)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.0.join(rel);
        fs::create_dir_all(&path).expect("create dir");
        path
    }

    pub fn touch(&self, rel: &str) -> PathBuf {
        self.write(rel, "")
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.0.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Writes an executable `/bin/sh` script.
    #[cfg(unix)]
    pub fn script(&self, rel: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(rel, &format!("#!/bin/sh\n{body}\n"));
        let mut perms = fs::metadata(&path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod script");
        path
    }

    /// Number of lines in a counter file appended to by test scripts.
    pub fn count_lines(&self, rel: &str) -> usize {
        fs::read_to_string(self.0.join(rel))
            .map(|raw| raw.lines().count())
            .unwrap_or(0)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

pub fn sample_settings(runtime: RuntimeDescriptor) -> LaunchSettings {
    let prefix_path = (!runtime.is_native()).then(|| PathBuf::from("/prefixes/celeste"));

    LaunchSettings {
        title_id: "celeste".to_string(),
        display_name: "Celeste".to_string(),
        install_path: PathBuf::from("/games/celeste"),
        executable: "Celeste.exe".to_string(),
        launch_args: Vec::new(),
        runtime: Some(runtime),
        prefix_path,
        env_overrides: Default::default(),
        wrappers: Default::default(),
        features: Default::default(),
        scripts: Default::default(),
        sync_saves: false,
    }
}

#[derive(Default)]
pub struct MemoryConfig {
    titles: HashMap<String, LaunchSettings>,
    global: GlobalSettings,
}

impl MemoryConfig {
    pub fn new(global: GlobalSettings) -> Self {
        Self {
            titles: HashMap::new(),
            global,
        }
    }

    pub fn with_title(mut self, settings: LaunchSettings) -> Self {
        self.titles.insert(settings.title_id.clone(), settings);
        self
    }
}

#[async_trait]
impl ConfigurationPort for MemoryConfig {
    async fn title_settings(&self, title_id: &str) -> Result<LaunchSettings, GantryError> {
        self.titles
            .get(title_id)
            .cloned()
            .ok_or_else(|| GantryError::UnknownTitle(title_id.to_string()))
    }

    async fn global_settings(&self) -> Result<GlobalSettings, GantryError> {
        Ok(self.global.clone())
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    sent: Mutex<Vec<(String, LaunchStatus)>>,
}

impl RecordingStatus {
    pub fn statuses(&self, title_id: &str) -> Vec<LaunchStatus> {
        self.sent
            .lock()
            .expect("status lock")
            .iter()
            .filter(|(title, _)| title == title_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl StatusBroadcaster for RecordingStatus {
    fn send_status(
        &self,
        title_id: &str,
        _runner: &str,
        status: LaunchStatus,
        _progress: Option<&Progress>,
    ) {
        self.sent
            .lock()
            .expect("status lock")
            .push((title_id.to_string(), status));
    }
}

#[derive(Default)]
pub struct RecordingDialog {
    shown: Mutex<Vec<LaunchFailure>>,
}

impl RecordingDialog {
    pub fn failures(&self) -> Vec<LaunchFailure> {
        self.shown.lock().expect("dialog lock").clone()
    }
}

impl DialogPort for RecordingDialog {
    fn show_failure(&self, failure: &LaunchFailure) {
        self.shown.lock().expect("dialog lock").push(failure.clone());
    }
}

#[derive(Default)]
pub struct RecordingSaveSync {
    calls: Mutex<Vec<SyncDirection>>,
}

impl RecordingSaveSync {
    pub fn calls(&self) -> Vec<SyncDirection> {
        self.calls.lock().expect("sync lock").clone()
    }
}

#[async_trait]
impl SaveSyncPort for RecordingSaveSync {
    async fn sync(&self, _settings: &LaunchSettings, direction: SyncDirection) -> Result<(), String> {
        self.calls.lock().expect("sync lock").push(direction);
        match direction {
            SyncDirection::Download => Ok(()),
            SyncDirection::Upload => Err("cloud unreachable".to_string()),
        }
    }
}

#[derive(Default)]
pub struct RecordingPresence {
    events: Mutex<Vec<String>>,
}

impl RecordingPresence {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("presence lock").clone()
    }
}

impl PresencePort for RecordingPresence {
    fn set_playing(&self, title_id: &str, label: &str) {
        self.events
            .lock()
            .expect("presence lock")
            .push(format!("playing:{title_id}:{label}"));
    }

    fn clear(&self, title_id: &str) {
        self.events
            .lock()
            .expect("presence lock")
            .push(format!("clear:{title_id}"));
    }
}

#[derive(Default)]
pub struct MemoryTitleLog {
    text: Mutex<String>,
    closed: AtomicBool,
}

impl MemoryTitleLog {
    pub fn text(&self) -> String {
        self.text.lock().expect("title log lock").clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TitleLog for MemoryTitleLog {
    fn write_string(&self, text: &str) {
        self.text.lock().expect("title log lock").push_str(text);
    }

    fn log_info(&self, message: &str) {
        self.write_string(&format!("[info] {message}\n"));
    }

    fn log_error(&self, message: &str) {
        self.write_string(&format!("[error] {message}\n"));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MemoryTitleLogs {
    logs: Mutex<HashMap<String, Arc<MemoryTitleLog>>>,
}

impl MemoryTitleLogs {
    pub fn get(&self, title_id: &str) -> Arc<MemoryTitleLog> {
        self.logs
            .lock()
            .expect("title logs lock")
            .entry(title_id.to_string())
            .or_default()
            .clone()
    }
}

impl TitleLogFactory for MemoryTitleLogs {
    fn open(&self, title_id: &str) -> Arc<dyn TitleLog> {
        self.get(title_id)
    }
}

#[derive(Default)]
pub struct MemoryPlaytime {
    records: Mutex<HashMap<String, PlaytimeRecord>>,
}

impl MemoryPlaytime {
    pub fn get(&self, title_id: &str) -> Option<PlaytimeRecord> {
        self.records.lock().expect("playtime lock").get(title_id).cloned()
    }
}

impl PlaytimeStore for MemoryPlaytime {
    fn load(&self, title_id: &str) -> Result<Option<PlaytimeRecord>, GantryError> {
        Ok(self.get(title_id))
    }

    fn save(&self, title_id: &str, record: &PlaytimeRecord) -> Result<(), GantryError> {
        self.records
            .lock()
            .expect("playtime lock")
            .insert(title_id.to_string(), record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingInhibitor {
    inhibits: AtomicUsize,
    uninhibits: AtomicUsize,
}

impl CountingInhibitor {
    pub fn inhibits(&self) -> usize {
        self.inhibits.load(Ordering::SeqCst)
    }

    pub fn uninhibits(&self) -> usize {
        self.uninhibits.load(Ordering::SeqCst)
    }
}

impl DisplayInhibitor for CountingInhibitor {
    fn inhibit(&self) -> Result<(), String> {
        self.inhibits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn uninhibit(&self) {
        self.uninhibits.fetch_add(1, Ordering::SeqCst);
    }
}
