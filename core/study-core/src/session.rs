//! Single-active study session lifecycle.
//!
//! ```text
//! Idle ──start──▶ Starting ──ok──▶ Active ──end──▶ Ending ──ok──▶ Idle
//!                    │                               │
//!                    └──err/timeout──▶ Idle          └──err/timeout──▶ Active
//! ```
//!
//! `Starting`/`Ending` are transient flags for disabling UI actions; they are
//! never persisted and are cleared on success, failure, and cancellation.
//!
//! # State Ownership
//!
//! The current [`SessionSnapshot`] lives in a `tokio::sync::watch` channel.
//! Every mutation is a synchronous `send_modify`, so no lock is ever held across
//! a remote call and observers ([`SessionManager::subscribe`]) see each
//! transition.
//!
//! # Durability
//!
//! Whenever the active session appears or disappears, the change is mirrored
//! to the durable medium under [`SESSION_STORAGE_KEY`] before the operation
//! returns. Mirror writes are best-effort: a fault only costs resume-after-
//! restart, never the in-memory truth.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartstudy_protocol::{parse_timestamp, StudySessionRecord};
use tokio::sync::watch;

use crate::error::{RemoteError, StorageFault};
use crate::medium::DurableMedium;

pub const SESSION_STORAGE_KEY: &str = "smartstudy_session_active";
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

// ═══════════════════════════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The in-progress study session, as confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: i64,
    pub user_id: i64,
    pub material_id: i64,
    #[serde(deserialize_with = "lenient_time::deserialize")]
    pub start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_time::deserialize_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

impl TryFrom<StudySessionRecord> for ActiveSession {
    type Error = RemoteError;

    fn try_from(record: StudySessionRecord) -> Result<Self, Self::Error> {
        record
            .validate()
            .map_err(|info| RemoteError::Decode(info.to_string()))?;
        let start_time = parse_timestamp(&record.start_time)
            .ok_or_else(|| RemoteError::Decode("start_time is not a timestamp".to_string()))?;
        Ok(Self {
            id: record.id,
            user_id: record.user_id,
            material_id: record.material_id,
            start_time,
            end_time: record.end_time.as_deref().and_then(parse_timestamp),
            duration_minutes: record.duration_minutes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Starting,
    Active,
    Ending,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Ending => write!(f, "ending"),
        }
    }
}

/// What observers see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub active: Option<ActiveSession>,
    pub starting: bool,
    pub ending: bool,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        if self.starting {
            SessionPhase::Starting
        } else if self.ending {
            SessionPhase::Ending
        } else if self.active.is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Idle
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|session| session.start_time)
    }
}

/// Remote start/end collaborator.
///
/// Failures are opaque to the manager: it only needs to know whether the call
/// succeeded.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start_session(&self, material_id: i64) -> Result<StudySessionRecord, RemoteError>;

    async fn end_session(&self, session_id: i64) -> Result<StudySessionRecord, RemoteError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Manager
// ═══════════════════════════════════════════════════════════════════════════════

pub struct SessionManager {
    medium: Arc<dyn DurableMedium>,
    api: Arc<dyn SessionApi>,
    state: watch::Sender<SessionSnapshot>,
    remote_timeout: Duration,
}

impl SessionManager {
    /// Creates an idle manager. Call [`SessionManager::rehydrate`] to restore a
    /// persisted session.
    pub fn new(medium: Arc<dyn DurableMedium>, api: Arc<dyn SessionApi>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            medium,
            api,
            state,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        self.state.borrow().active.clone()
    }

    pub fn is_starting(&self) -> bool {
        self.state.borrow().starting
    }

    pub fn is_ending(&self) -> bool {
        self.state.borrow().ending
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Restores the persisted session without contacting the server.
    ///
    /// An unreadable value is dropped from the medium and leaves the manager idle.
    pub fn rehydrate(&self) -> Option<ActiveSession> {
        let restored = match self.read_persisted() {
            Ok(session) => session,
            Err(err @ (StorageFault::Json { .. } | StorageFault::Corrupt { .. })) => {
                tracing::warn!(error = %err, "Discarding corrupt persisted session");
                if let Err(remove_err) = self.medium.remove(SESSION_STORAGE_KEY) {
                    tracing::warn!(error = %remove_err, "Failed to remove corrupt persisted session");
                }
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "Persisted session unavailable; starting idle");
                None
            }
        };

        if let Some(session) = &restored {
            tracing::info!(
                session_id = session.id,
                material_id = session.material_id,
                "Rehydrated active study session"
            );
        }
        self.state.send_modify(|state| state.active = restored.clone());
        restored
    }

    /// Starts a session for `material_id`.
    ///
    /// Returns `Ok(None)` without calling the server when a session is already
    /// active or a transition is in flight.
    pub async fn start(&self, material_id: i64) -> Result<Option<ActiveSession>, RemoteError> {
        let claimed = self.state.send_if_modified(|state| {
            if state.active.is_some() || state.starting || state.ending {
                return false;
            }
            state.starting = true;
            true
        });
        if !claimed {
            tracing::debug!(material_id, phase = %self.phase(), "Ignoring start request");
            return Ok(None);
        }
        let _flag = TransientFlag::new(&self.state, SessionPhase::Starting);

        let record = self
            .bounded(self.api.start_session(material_id))
            .await
            .inspect_err(|err| tracing::warn!(material_id, error = %err, "Session start failed"))?;
        let session = ActiveSession::try_from(record)?;

        self.persist(Some(&session));
        self.state.send_modify(|state| {
            state.active = Some(session.clone());
            state.starting = false;
        });
        tracing::info!(
            session_id = session.id,
            material_id = session.material_id,
            start_time = %session.start_time,
            "Study session started"
        );
        Ok(Some(session))
    }

    /// Ends the active session.
    ///
    /// Returns the ended session with the server's end time and duration, or
    /// `Ok(None)` when there was nothing to end. On failure the session stays
    /// active so the caller can retry.
    pub async fn end(&self) -> Result<Option<ActiveSession>, RemoteError> {
        let mut claimed = None;
        self.state.send_if_modified(|state| match &state.active {
            Some(session) if !state.starting && !state.ending => {
                claimed = Some(session.clone());
                state.ending = true;
                true
            }
            _ => false,
        });
        let Some(session) = claimed else {
            tracing::debug!(phase = %self.phase(), "Ignoring end request");
            return Ok(None);
        };
        let _flag = TransientFlag::new(&self.state, SessionPhase::Ending);

        let record = self
            .bounded(self.api.end_session(session.id))
            .await
            .inspect_err(|err| tracing::warn!(session_id = session.id, error = %err, "Session end failed"))?;

        self.persist(None);
        self.state.send_modify(|state| {
            state.active = None;
            state.ending = false;
        });

        let ended = ActiveSession {
            end_time: record.end_time.as_deref().and_then(parse_timestamp),
            duration_minutes: record.duration_minutes,
            ..session
        };
        tracing::info!(
            session_id = ended.id,
            duration_minutes = ?ended.duration_minutes,
            "Study session ended"
        );
        Ok(Some(ended))
    }

    /// Replaces the active session directly, writing through to the medium.
    pub fn set_active(&self, session: Option<ActiveSession>) {
        self.persist(session.as_ref());
        self.state.send_modify(|state| state.active = session);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.remote_timeout)),
        }
    }

    fn read_persisted(&self) -> Result<Option<ActiveSession>, StorageFault> {
        let Some(raw) = self.medium.get(SESSION_STORAGE_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageFault::Json {
                key: SESSION_STORAGE_KEY.to_string(),
                source,
            })
    }

    fn try_persist(&self, session: Option<&ActiveSession>) -> Result<(), StorageFault> {
        match session {
            Some(session) => {
                let raw = serde_json::to_string(session).map_err(|source| StorageFault::Json {
                    key: SESSION_STORAGE_KEY.to_string(),
                    source,
                })?;
                self.medium.set(SESSION_STORAGE_KEY, &raw)
            }
            None => self.medium.remove(SESSION_STORAGE_KEY),
        }
    }

    fn persist(&self, session: Option<&ActiveSession>) {
        if let Err(err) = self.try_persist(session) {
            tracing::warn!(error = %err, "Failed to mirror session state to storage");
        }
    }
}

/// Clears a transient flag when the in-flight transition finishes or is dropped.
struct TransientFlag<'a> {
    state: &'a watch::Sender<SessionSnapshot>,
    phase: SessionPhase,
}

impl<'a> TransientFlag<'a> {
    fn new(state: &'a watch::Sender<SessionSnapshot>, phase: SessionPhase) -> Self {
        Self { state, phase }
    }
}

impl Drop for TransientFlag<'_> {
    fn drop(&mut self) {
        let phase = self.phase;
        self.state.send_if_modified(|state| {
            let flag = match phase {
                SessionPhase::Starting => &mut state.starting,
                SessionPhase::Ending => &mut state.ending,
                SessionPhase::Idle | SessionPhase::Active => return false,
            };
            std::mem::replace(flag, false)
        });
    }
}

mod lenient_time {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer};
    use smartstudy_protocol::parse_timestamp;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn deserialize_opt<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw))),
            None => Ok(None),
        }
    }
}
