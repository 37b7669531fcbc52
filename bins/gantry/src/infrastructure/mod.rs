pub mod dialog;
pub mod fs_config;
pub mod inhibitor;
pub mod paths;
pub mod playtime_store;
pub mod presence;
pub mod save_sync;
pub mod status;
pub mod title_log;

#[cfg(test)]
pub(crate) mod test_dir {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub struct TestDir(PathBuf);

    impl TestDir {
        pub fn new(label: &str) -> Self {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time should be monotonic")
                .as_nanos();
            let dir = std::env::temp_dir().join(format!(
                "gantry-cli-test-{label}-{}-{ts}",
                std::process::id()
            ));
            fs::create_dir_all(&dir).expect("create test dir");
            Self(dir)
        }

        pub fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }
}
