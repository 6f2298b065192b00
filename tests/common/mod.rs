use std::fs;
use std::path::{Path, PathBuf};

use ulid::Ulid;

/// TestDir is an isolated scratch directory, removed on drop
pub struct TestDir {
    dir: PathBuf,
}

impl TestDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("mmstore-test-{}", Ulid::new()));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        TestDir { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Base path (without format suffix) for a store named `name`
    pub fn base(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}
