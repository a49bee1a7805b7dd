//! # study-core
//!
//! Client-side persistence core for SmartStudy: the single active study
//! session, the per-material AI result cache, and the elapsed-time timer.
//!
//! ## Design Principles
//!
//! - **Graceful degradation**: storage faults degrade to "absent" or "not
//!   persisted"; they never reach the caller of the cache or session mirror.
//! - **One active session**: `start` while active or mid-transition is a no-op.
//! - **Explicit context**: [`StudyEngine`] owns the medium and every component
//!   built on it. No globals.
//! - **Async only at the edges**: only remote start/end and the ticker await.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use study_core::{load_study_config, StorageConfig, StudyEngine, Tool};
//!
//! let storage = StorageConfig::default();
//! let config = load_study_config(&storage).with_env_overrides();
//! let engine = StudyEngine::open(storage, config, api)?;
//! engine.sessions().start(42).await?;
//! let cached = engine.cache().load(42, Tool::Summary);
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod elapsed;
pub mod engine;
pub mod error;
pub mod medium;
pub mod session;
pub mod storage;

pub use cache::{
    cache_key, parse_cache_key, ArtifactContent, ArtifactMeta, CachedArtifact, ResultCache,
    SaveMeta, Tool, UnknownTool, CACHE_KEY_PREFIX,
};
pub use clock::{Clock, ClockSource, SystemClock, DEFAULT_TICK_INTERVAL};
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;
pub use config::{load_study_config, save_study_config, StudyConfig};
pub use elapsed::{derive, format_label, human_time, Elapsed, ElapsedTicker};
pub use engine::StudyEngine;
pub use error::{RemoteError, Result, StorageFault, StudyError};
pub use medium::{DurableMedium, FileMedium, MemoryMedium};
pub use session::{
    ActiveSession, SessionApi, SessionManager, SessionPhase, SessionSnapshot,
    DEFAULT_REMOTE_TIMEOUT, SESSION_STORAGE_KEY,
};
pub use storage::StorageConfig;
