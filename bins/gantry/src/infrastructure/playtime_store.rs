use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use gantry_core::playtime::PlaytimeRecord;
use gantry_core::ports::PlaytimeStore;
use gantry_core::GantryError;

type Records = BTreeMap<String, PlaytimeRecord>;

/// All titles' playtime in one JSON object keyed by title id.
pub struct JsonPlaytimeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPlaytimeStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Records, GantryError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Records::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Records::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl PlaytimeStore for JsonPlaytimeStore {
    fn load(&self, title_id: &str) -> Result<Option<PlaytimeRecord>, GantryError> {
        Ok(self.read_all()?.remove(title_id))
    }

    fn save(&self, title_id: &str, record: &PlaytimeRecord) -> Result<(), GantryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = self.read_all()?;
        records.insert(title_id.to_string(), record.clone());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
