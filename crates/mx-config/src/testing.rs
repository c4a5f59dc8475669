//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated scratch tree for filesystem operations
//! - Global and project config files
//!
//! and `CaptureBuffer`, an in-memory writer for capturing console streams.
//!
//! # Usage
//!
//! ```ignore
//! use mx_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     env.write_project_config("verbose = true\n").unwrap();
//!     let options = env.load_options().unwrap();
//! }
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::{ConfigError, Options};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Stand-in for the user's home directory
    pub home: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let home = root.join("home");
        let project_root = root.join(format!("project-{}", test_id));

        std::fs::create_dir_all(home.join(".mx"))?;
        std::fs::create_dir_all(project_root.join(".mx"))?;

        Ok(Self {
            _temp_dir: temp_dir,
            home,
            project_root,
            test_id,
        })
    }

    /// Global config path inside the fake home
    pub fn global_config_path(&self) -> PathBuf {
        self.home.join(".mx").join("config.toml")
    }

    /// Project config path
    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".mx").join("config.toml")
    }

    pub fn write_global_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.global_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Load options from this environment's config files (no env overrides)
    pub fn load_options(&self) -> Result<Options, ConfigError> {
        let global = self.global_config_path();
        Options::load_from(Some(&global), &self.project_config_path())
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test directory
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Path under the project root, not created
    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.project_root.join(relative_path)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// Cloneable in-memory writer. All clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        match self.inner.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("capture buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.home.join(".mx").exists());
        assert!(env.project_root.join(".mx").exists());
    }

    #[test]
    fn test_environment_has_unique_project() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.test_id, env2.test_id);
        assert_ne!(env1.project_root, env2.project_root);
    }

    #[test]
    fn test_create_file() {
        let env = TestEnvironment::new().unwrap();
        let path = env.create_file("src/main.rs", b"fn main() {}").unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"fn main() {}");
    }

    #[test]
    fn test_capture_buffer_shares_contents() {
        let buf = CaptureBuffer::new();
        let mut writer = buf.clone();
        writeln!(writer, "hello").unwrap();
        assert_eq!(buf.contents(), "hello\n");
    }
}
