use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use gantry_core::observability::now_utc_rfc3339_millis;
use gantry_core::ports::{TitleLog, TitleLogFactory};

use super::paths::validate_title_id;

/// One `<title>.log` per title under the logs directory. The previous run's
/// log is kept as `<title>.last.log`.
pub struct FileTitleLogs {
    dir: PathBuf,
}

impl FileTitleLogs {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn open_file(&self, title_id: &str) -> Option<File> {
        let title_id = validate_title_id(title_id).ok()?;
        fs::create_dir_all(&self.dir).ok()?;

        let current = self.dir.join(format!("{title_id}.log"));
        if current.exists() {
            let _ = fs::rename(&current, self.dir.join(format!("{title_id}.last.log")));
        }

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&current)
            .ok()
    }
}

impl TitleLogFactory for FileTitleLogs {
    fn open(&self, title_id: &str) -> Arc<dyn TitleLog> {
        Arc::new(FileTitleLog {
            file: Mutex::new(self.open_file(title_id)),
        })
    }
}

/// Writes are dropped once closed or when the file could not be opened.
pub struct FileTitleLog {
    file: Mutex<Option<File>>,
}

impl FileTitleLog {
    fn append(&self, text: &str) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = file.as_mut() {
            let _ = file.write_all(text.as_bytes());
        }
    }
}

impl TitleLog for FileTitleLog {
    fn write_string(&self, text: &str) {
        self.append(text);
    }

    fn log_info(&self, message: &str) {
        self.append(&format!("{} INFO {message}\n", now_utc_rfc3339_millis()));
    }

    fn log_error(&self, message: &str) {
        self.append(&format!("{} ERROR {message}\n", now_utc_rfc3339_millis()));
    }

    fn close(&self) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = file.as_mut() {
            let _ = file.flush();
        }
        *file = None;
    }
}

pub fn title_log_path(dir: &Path, title_id: &str) -> PathBuf {
    dir.join(format!("{title_id}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::test_dir::TestDir;

    #[test]
    fn reopening_rotates_previous_log() {
        let dir = TestDir::new("title-log");
        let logs = FileTitleLogs::new(dir.path().join("logs"));

        let first = logs.open("celeste");
        first.write_string("first run\n");
        first.close();
        first.write_string("after close\n");

        let second = logs.open("celeste");
        second.log_error("boom");
        second.close();

        let last = fs::read_to_string(dir.path().join("logs/celeste.last.log")).expect("last log");
        assert_eq!(last, "first run\n");
        let current =
            fs::read_to_string(title_log_path(&dir.path().join("logs"), "celeste")).expect("log");
        assert!(current.ends_with("ERROR boom\n"));
    }
}
