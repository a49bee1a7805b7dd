//! Error types for study-core operations.
//!
//! Storage faults are recovered inside the core and never reach callers of the
//! cache or the session mirror. Remote faults are surfaced unchanged.

use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Storage Faults (recovered locally)
// ═══════════════════════════════════════════════════════════════════════════════

/// A failure of the durable key/value medium.
#[derive(Debug, thiserror::Error)]
pub enum StorageFault {
    #[error("Storage medium unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value for {key} is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored value for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StorageFault {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Remote Faults (surfaced to the caller)
// ═══════════════════════════════════════════════════════════════════════════════

/// A failed call to the remote session collaborator.
///
/// The session manager only distinguishes success from failure; the variants
/// exist so the presentation layer can word its message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote API is not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Crate Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can escape study-core.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Storage(#[from] StorageFault),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using StudyError.
pub type Result<T> = std::result::Result<T, StudyError>;

impl From<StudyError> for String {
    fn from(err: StudyError) -> String {
        err.to_string()
    }
}
