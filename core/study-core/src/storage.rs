//! Storage configuration and path management for SmartStudy.
//!
//! `StorageConfig` is the single place that decides where client data lives:
//!
//! ```text
//! ~/.smartstudy/
//! ├── config.json     # StudyConfig (API URL, token, timeouts)
//! ├── store/          # FileMedium: one JSON file per key
//! └── logs/           # rolling CLI logs
//! ```
//!
//! Tests use `StorageConfig::with_root(temp_dir)` for isolation.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that relocates the whole data root.
pub const HOME_ENV: &str = "SMARTSTUDY_HOME";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all SmartStudy data (default: ~/.smartstudy)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        if let Some(root) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
            return Self {
                root: PathBuf::from(root),
            };
        }
        let home = dirs::home_dir().unwrap_or_else(env::temp_dir);
        Self {
            root: home.join(".smartstudy"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing the durable key/value medium.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Path to config.json (API endpoint and client preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.store_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
