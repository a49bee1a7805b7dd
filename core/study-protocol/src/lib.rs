//! Wire types for the SmartStudy remote API.
//!
//! Shared by the persistence core and the HTTP client so the two agree on the
//! JSON shapes. The server remains the authority on validation; clients use
//! [`StudySessionRecord::validate`] to reject payloads they could not persist
//! or time against.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_PREFIX: &str = "/api";
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024; // 1MB

/// Path of the session start endpoint. `material_id` travels as a query parameter.
pub fn start_session_path() -> String {
    format!("{}/study-sessions/start", API_PREFIX)
}

pub fn end_session_path(session_id: i64) -> String {
    format!("{}/study-sessions/{}/end", API_PREFIX, session_id)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Study Sessions
// ═══════════════════════════════════════════════════════════════════════════════

/// A study session as returned by both the start and end endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySessionRecord {
    pub id: i64,
    pub user_id: i64,
    pub material_id: i64,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

impl StudySessionRecord {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.id <= 0 {
            return Err(ErrorInfo::new("invalid_id", "id must be positive"));
        }
        if self.material_id <= 0 {
            return Err(ErrorInfo::new(
                "invalid_material_id",
                "material_id must be positive",
            ));
        }
        if parse_timestamp(&self.start_time).is_none() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "start_time must be an ISO-8601 instant",
            ));
        }
        if let Some(end_time) = &self.end_time {
            if parse_timestamp(end_time).is_none() {
                return Err(ErrorInfo::new(
                    "invalid_timestamp",
                    "end_time must be an ISO-8601 instant",
                ));
            }
        }
        if matches!(self.duration_minutes, Some(minutes) if minutes < 0) {
            return Err(ErrorInfo::new(
                "invalid_duration",
                "duration_minutes must not be negative",
            ));
        }
        Ok(())
    }
}

/// Parses a server timestamp.
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` form the API
/// emits for `utcnow()` values, which is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

// ═══════════════════════════════════════════════════════════════════════════════
// AI Artifacts
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub question: String,
    pub options: Vec<McqOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardsResponse {
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqResponse {
    pub questions: Vec<McqQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned by the API (`{"detail": ...}`).
///
/// `detail` is a string for handled errors and a list of objects for request
/// validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}

/// Client-side validation failure for a payload the API returned.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub fn parse_session(body: &[u8]) -> Result<StudySessionRecord, ErrorInfo> {
    if body.len() > MAX_RESPONSE_BYTES {
        return Err(ErrorInfo::new(
            "response_too_large",
            "session payload exceeded maximum size",
        ));
    }
    let record: StudySessionRecord = serde_json::from_slice(body).map_err(|err| {
        ErrorInfo::new(
            "invalid_payload",
            format!("session payload is invalid JSON: {}", err),
        )
    })?;
    record.validate()?;
    Ok(record)
}
