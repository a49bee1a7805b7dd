//! Client configuration loading and saving.
//!
//! `config.json` lives under the storage root. A missing file yields defaults;
//! a malformed one is logged and also yields defaults, so a hand-edited typo
//! never blocks the client from starting.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};
use crate::storage::StorageConfig;

pub const API_URL_ENV: &str = "SMARTSTUDY_API_URL";
pub const TOKEN_ENV: &str = "SMARTSTUDY_TOKEN";

const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Base URL of the SmartStudy API, e.g. `http://localhost:8000`.
    pub api_base_url: Option<String>,
    /// Bearer token sent with every remote call.
    pub token: Option<String>,
    pub remote_timeout_secs: u64,
    pub tick_interval_ms: u64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            token: None,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl StudyConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Applies `SMARTSTUDY_API_URL` / `SMARTSTUDY_TOKEN` on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        )
    }

    fn with_overrides(mut self, api_url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|value| !value.trim().is_empty()) {
            self.api_base_url = Some(url);
        }
        if let Some(token) = token.filter(|value| !value.trim().is_empty()) {
            self.token = Some(token);
        }
        self
    }
}

/// Loads the configuration, returning defaults if the file is missing or malformed.
pub fn load_study_config(storage: &StorageConfig) -> StudyConfig {
    match read_study_config(&storage.config_file()) {
        Ok(Some(config)) => config,
        Ok(None) => StudyConfig::default(),
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring unreadable config; using defaults");
            StudyConfig::default()
        }
    }
}

/// Strict read used by [`load_study_config`].
pub fn read_study_config(path: &Path) -> Result<Option<StudyConfig>> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(StudyError::ConfigMalformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| StudyError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
}

/// Saves the configuration to disk.
pub fn save_study_config(storage: &StorageConfig, config: &StudyConfig) -> Result<()> {
    let path = storage.config_file();
    let write_failed = |source| StudyError::ConfigWriteFailed {
        path: path.clone(),
        source,
    };
    fs_err::create_dir_all(storage.root()).map_err(write_failed)?;
    let content = serde_json::to_string_pretty(config).map_err(|err| {
        StudyError::ConfigMalformed {
            path: path.clone(),
            details: err.to_string(),
        }
    })?;
    fs_err::write(&path, content).map_err(write_failed)
}
