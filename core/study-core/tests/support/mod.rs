//! Shared fakes for study-core integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use smartstudy_protocol::StudySessionRecord;
use study_core::{RemoteError, SessionApi};
use tokio::sync::Notify;

pub const START_TIME: &str = "2026-03-01T09:00:00";
pub const END_TIME: &str = "2026-03-01T09:25:00";

/// In-process stand-in for the session API.
///
/// Counts calls, hands out increasing ids, and can be told to fail or to hold
/// start or end calls until released.
#[derive(Default)]
pub struct ScriptedApi {
    pub start_calls: AtomicUsize,
    pub end_calls: AtomicUsize,
    fail_start: AtomicBool,
    fail_end: AtomicBool,
    next_id: AtomicI64,
    gate: Option<Arc<Notify>>,
    end_gate: Option<Arc<Notify>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start calls wait for `gate.notify_one()` before answering.
    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Self::default()
        })
    }

    /// End calls wait for `gate.notify_one()` before answering.
    pub fn gated_end(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            end_gate: Some(gate),
            ..Self::default()
        })
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_end(&self, fail: bool) {
        self.fail_end.store(fail, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionApi for ScriptedApi {
    async fn start_session(&self, material_id: i64) -> Result<StudySessionRecord, RemoteError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 400,
                detail: "You already have an active study session".to_string(),
            });
        }
        Ok(StudySessionRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: 1,
            material_id,
            start_time: START_TIME.to_string(),
            end_time: None,
            duration_minutes: Some(0),
        })
    }

    async fn end_session(&self, session_id: i64) -> Result<StudySessionRecord, RemoteError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.end_gate {
            gate.notified().await;
        }
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        Ok(StudySessionRecord {
            id: session_id,
            user_id: 1,
            material_id: 1,
            start_time: START_TIME.to_string(),
            end_time: Some(END_TIME.to_string()),
            duration_minutes: Some(25),
        })
    }
}
