//! Durable key/value medium.
//!
//! The cache and the session manager persist through [`DurableMedium`], a
//! synchronous string-keyed store whose values are JSON text. Two backends:
//!
//! - [`MemoryMedium`]: process-local map with optional quota, used by tests and
//!   ephemeral clients. The `test-helpers` feature adds an availability switch
//!   and a wipe.
//! - [`FileMedium`]: one file per key under a directory, surviving restarts.
//!
//! # Atomic Writes
//!
//! `FileMedium` writes through a temp file in the same directory and renames it
//! over the target, so a crash mid-write leaves the previous value intact.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use crate::error::StorageFault;

/// A synchronous string-keyed store shared by all core components.
///
/// Every call addresses exactly one key. Implementations report faults instead
/// of panicking; callers decide whether a fault is fatal.
pub trait DurableMedium: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageFault>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageFault>;

    /// Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageFault>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory medium
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, String>,
    unavailable: bool,
}

/// Process-local medium.
///
/// `quota_bytes` bounds the sum of key and value lengths, mirroring the quota
/// a browser applies to local storage.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    state: Mutex<MemoryState>,
    quota_bytes: Option<usize>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Makes every subsequent call fail with [`StorageFault::Unavailable`]
    /// (or succeed again), like storage disabled by the user agent.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = !available;
        }
    }

    /// Drops every entry. Models a full storage wipe.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn wipe(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageFault> {
        let state = self
            .state
            .lock()
            .map_err(|_| StorageFault::Unavailable("memory medium lock poisoned".to_string()))?;
        if state.unavailable {
            return Err(StorageFault::Unavailable(
                "memory medium disabled".to_string(),
            ));
        }
        Ok(state)
    }
}

impl DurableMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageFault> {
        let mut state = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = state
                .entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageFault::Unavailable(format!(
                    "quota of {} bytes exceeded writing {}",
                    quota, key
                )));
            }
        }
        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageFault> {
        self.lock()?.entries.remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed medium
// ═══════════════════════════════════════════════════════════════════════════════

/// Directory-backed medium: `{dir}/{encoded key}.json`.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl DurableMedium for FileMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        let path = self.path_for(key);
        let bytes = match fs_err::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageFault::io(format!("reading {}", key), err)),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StorageFault::corrupt(key, "stored value is not valid UTF-8"))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageFault> {
        fs_err::create_dir_all(&self.dir)
            .map_err(|err| StorageFault::io("creating store directory", err))?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|err| StorageFault::io("creating temp file", err))?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(|err| StorageFault::io(format!("writing {}", key), err))?;
        temp_file
            .flush()
            .map_err(|err| StorageFault::io(format!("flushing {}", key), err))?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| StorageFault::io(format!("committing {}", key), err.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageFault> {
        match fs_err::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageFault::io(format!("removing {}", key), err)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encodes a medium key as a file name.
///
/// ASCII alphanumerics, `-`, `_` and `.` pass through; every other byte becomes
/// `%XX`. Unlike a plain character swap this is injective, so distinct keys
/// never share a file.
pub fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
