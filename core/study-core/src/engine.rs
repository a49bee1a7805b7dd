//! StudyEngine - the context object SmartStudy clients hold.
//!
//! Owns the durable medium and everything built on it: the result cache, the
//! session manager, and the clock source the elapsed timer samples. Nothing in
//! the core is global; a client constructs one engine at startup and passes it
//! around.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use study_core::{load_study_config, StorageConfig, StudyEngine};
//!
//! let storage = StorageConfig::default();
//! let config = load_study_config(&storage).with_env_overrides();
//! let engine = StudyEngine::open(storage, config, api)?;
//! if let Some(session) = engine.sessions().active_session() {
//!     println!("resumed session {}", session.id);
//! }
//! ```

use std::sync::Arc;

use crate::cache::ResultCache;
use crate::clock::{Clock, ClockSource, SystemClock};
use crate::config::StudyConfig;
use crate::error::{Result, StorageFault};
use crate::medium::{DurableMedium, FileMedium};
use crate::session::{SessionApi, SessionManager};
use crate::storage::StorageConfig;

pub struct StudyEngine {
    storage: StorageConfig,
    config: StudyConfig,
    medium: Arc<dyn DurableMedium>,
    cache: ResultCache,
    sessions: SessionManager,
    clock: Arc<ClockSource>,
}

impl StudyEngine {
    /// Opens the file-backed store under `storage` and rehydrates.
    pub fn open(
        storage: StorageConfig,
        config: StudyConfig,
        api: Arc<dyn SessionApi>,
    ) -> Result<Self> {
        storage
            .ensure_dirs()
            .map_err(|err| StorageFault::io("creating data directories", err))?;
        let medium: Arc<dyn DurableMedium> = Arc::new(FileMedium::new(storage.store_dir()));
        Ok(Self::init(storage, config, medium, api, Arc::new(SystemClock)))
    }

    /// Wires the components over an explicit medium and clock, then rehydrates
    /// the active session.
    pub fn init(
        storage: StorageConfig,
        config: StudyConfig,
        medium: Arc<dyn DurableMedium>,
        api: Arc<dyn SessionApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResultCache::with_clock(Arc::clone(&medium), Arc::clone(&clock));
        let sessions = SessionManager::new(Arc::clone(&medium), api)
            .with_remote_timeout(config.remote_timeout());
        let clock = Arc::new(ClockSource::new(clock, config.tick_interval()));

        sessions.rehydrate();

        Self {
            storage,
            config,
            medium,
            cache,
            sessions,
            clock,
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn medium(&self) -> &Arc<dyn DurableMedium> {
        &self.medium
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Shared clock source for [`crate::elapsed::ElapsedTicker`].
    pub fn clock(&self) -> Arc<ClockSource> {
        Arc::clone(&self.clock)
    }
}

impl std::fmt::Debug for StudyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyEngine")
            .field("storage", &self.storage)
            .field("phase", &self.sessions.phase())
            .finish_non_exhaustive()
    }
}
