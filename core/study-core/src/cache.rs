//! Result cache for AI-generated study artifacts.
//!
//! One entry per (material, tool), stored as JSON under
//! `smartstudy_ai:{material_id}:{tool}`:
//!
//! ```json
//! {
//!   "materialId": 2,
//!   "tool": "mcq",
//!   "content": [{ "question": "...", "options": [...] }],
//!   "meta": { "createdAt": "2026-03-01T09:00:00Z", "params": { "num": 5 } }
//! }
//! ```
//!
//! # Failure Semantics
//!
//! The cache is best-effort memoization. `try_*` operations report every
//! [`StorageFault`]; the public `save`/`load`/`clear` log the fault and degrade
//! to "not written"/absent, so callers treat a fault and a miss identically.
//!
//! # Defensive Reads
//!
//! A stored entry is returned only if it parses, its own `materialId`/`tool`
//! match the requested key, and its content has the shape the tool requires.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smartstudy_protocol::{Flashcard, McqQuestion};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageFault;
use crate::medium::DurableMedium;

pub const CACHE_KEY_PREFIX: &str = "smartstudy_ai";

// ═══════════════════════════════════════════════════════════════════════════════
// Tool & Content
// ═══════════════════════════════════════════════════════════════════════════════

/// The four AI generation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Summary,
    Flashcards,
    Mcq,
    Explain,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Summary, Tool::Flashcards, Tool::Mcq, Tool::Explain];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Flashcards => "flashcards",
            Self::Mcq => "mcq",
            Self::Explain => "explain",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown tool '{}' (expected summary, flashcards, mcq or explain)",
            self.0
        )
    }
}

impl std::error::Error for UnknownTool {}

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.id() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// A generated artifact, typed by the tool that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Summary(String),
    Flashcards(Vec<Flashcard>),
    Mcq(Vec<McqQuestion>),
    Explanation(String),
}

impl ArtifactContent {
    pub fn tool(&self) -> Tool {
        match self {
            Self::Summary(_) => Tool::Summary,
            Self::Flashcards(_) => Tool::Flashcards,
            Self::Mcq(_) => Tool::Mcq,
            Self::Explanation(_) => Tool::Explain,
        }
    }

    /// Rebuilds typed content from its stored JSON shape.
    pub fn from_json(tool: Tool, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match tool {
            Tool::Summary => Self::Summary(serde_json::from_value(value)?),
            Tool::Flashcards => Self::Flashcards(serde_json::from_value(value)?),
            Tool::Mcq => Self::Mcq(serde_json::from_value(value)?),
            Tool::Explain => Self::Explanation(serde_json::from_value(value)?),
        })
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Summary(text) | Self::Explanation(text) => Ok(Value::String(text.clone())),
            Self::Flashcards(cards) => serde_json::to_value(cards),
            Self::Mcq(questions) => serde_json::to_value(questions),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

/// Caller-supplied metadata merged into the entry on save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveMeta {
    pub model: Option<String>,
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedArtifact {
    pub material_id: i64,
    pub content: ArtifactContent,
    pub meta: ArtifactMeta,
}

impl CachedArtifact {
    pub fn tool(&self) -> Tool {
        self.content.tool()
    }
}

/// On-medium JSON shape. Content stays untyped until the tool is verified.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    material_id: i64,
    tool: Tool,
    content: Value,
    meta: ArtifactMeta,
}

/// `smartstudy_ai:{material_id}:{tool}`
pub fn cache_key(material_id: i64, tool: Tool) -> String {
    format!("{}:{}:{}", CACHE_KEY_PREFIX, material_id, tool)
}

/// Reverses [`cache_key`].
pub fn parse_cache_key(key: &str) -> Option<(i64, Tool)> {
    let rest = key.strip_prefix(CACHE_KEY_PREFIX)?.strip_prefix(':')?;
    let (material, tool) = rest.rsplit_once(':')?;
    Some((material.parse().ok()?, tool.parse().ok()?))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ResultCache {
    medium: Arc<dyn DurableMedium>,
    clock: Arc<dyn Clock>,
}

impl ResultCache {
    pub fn new(medium: Arc<dyn DurableMedium>) -> Self {
        Self::with_clock(medium, Arc::new(SystemClock))
    }

    pub fn with_clock(medium: Arc<dyn DurableMedium>, clock: Arc<dyn Clock>) -> Self {
        Self { medium, clock }
    }

    /// Stores `content` for `material_id`, overwriting any previous entry for
    /// the same tool. Write faults are logged and swallowed; the constructed
    /// entry is returned either way.
    pub fn save(
        &self,
        material_id: i64,
        content: ArtifactContent,
        meta: Option<SaveMeta>,
    ) -> CachedArtifact {
        let entry = self.build_entry(material_id, content, meta.unwrap_or_default());
        if let Err(err) = self.try_write(&entry) {
            tracing::warn!(
                material_id,
                tool = %entry.tool(),
                error = %err,
                "Failed to write cache entry"
            );
        }
        entry
    }

    pub fn load(&self, material_id: i64, tool: Tool) -> Option<CachedArtifact> {
        match self.try_load(material_id, tool) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(material_id, tool = %tool, error = %err, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    pub fn clear(&self, material_id: i64, tool: Tool) {
        if let Err(err) = self.try_clear(material_id, tool) {
            tracing::warn!(material_id, tool = %tool, error = %err, "Failed to clear cache entry");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fallible core
    // ─────────────────────────────────────────────────────────────────────────

    pub fn try_save(
        &self,
        material_id: i64,
        content: ArtifactContent,
        meta: SaveMeta,
    ) -> Result<CachedArtifact, StorageFault> {
        let entry = self.build_entry(material_id, content, meta);
        self.try_write(&entry)?;
        Ok(entry)
    }

    pub fn try_load(
        &self,
        material_id: i64,
        tool: Tool,
    ) -> Result<Option<CachedArtifact>, StorageFault> {
        let key = cache_key(material_id, tool);
        let Some(raw) = self.medium.get(&key)? else {
            return Ok(None);
        };

        let stored: StoredEntry = serde_json::from_str(&raw).map_err(|source| StorageFault::Json {
            key: key.clone(),
            source,
        })?;
        if stored.material_id != material_id || stored.tool != tool {
            return Err(StorageFault::corrupt(
                key,
                format!(
                    "entry belongs to {}:{}",
                    stored.material_id, stored.tool
                ),
            ));
        }

        let content = ArtifactContent::from_json(tool, stored.content)
            .map_err(|source| StorageFault::Json { key, source })?;
        Ok(Some(CachedArtifact {
            material_id,
            content,
            meta: stored.meta,
        }))
    }

    pub fn try_clear(&self, material_id: i64, tool: Tool) -> Result<(), StorageFault> {
        self.medium.remove(&cache_key(material_id, tool))
    }

    fn build_entry(&self, material_id: i64, content: ArtifactContent, meta: SaveMeta) -> CachedArtifact {
        CachedArtifact {
            material_id,
            content,
            meta: ArtifactMeta {
                created_at: self.clock.now(),
                model: meta.model,
                params: meta.params,
            },
        }
    }

    fn try_write(&self, entry: &CachedArtifact) -> Result<(), StorageFault> {
        let key = cache_key(entry.material_id, entry.tool());
        let json_err = |source| StorageFault::Json {
            key: key.clone(),
            source,
        };
        let stored = StoredEntry {
            material_id: entry.material_id,
            tool: entry.tool(),
            content: entry.content.to_json().map_err(json_err)?,
            meta: entry.meta.clone(),
        };
        let raw = serde_json::to_string(&stored).map_err(json_err)?;
        self.medium.set(&key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::medium::MemoryMedium;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn cache_with(medium: Arc<MemoryMedium>) -> ResultCache {
        ResultCache::with_clock(medium, Arc::new(ManualClock::new(t0())))
    }

    fn question(text: &str) -> McqQuestion {
        McqQuestion {
            question: text.to_string(),
            options: vec![],
        }
    }

    #[test]
    fn save_stamps_created_at_and_merges_meta() {
        let cache = cache_with(Arc::new(MemoryMedium::new()));
        let mut params = Map::new();
        params.insert("length".to_string(), json!(1200));

        let entry = cache.save(
            1,
            ArtifactContent::Summary("short".to_string()),
            Some(SaveMeta {
                model: Some("gpt-4o-mini".to_string()),
                params: Some(params.clone()),
            }),
        );

        assert_eq!(entry.meta.created_at, t0());
        assert_eq!(entry.meta.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(entry.meta.params, Some(params));
        assert_eq!(cache.load(1, Tool::Summary), Some(entry));
    }

    #[test]
    fn stored_json_uses_camel_case_layout() {
        let medium = Arc::new(MemoryMedium::new());
        let cache = cache_with(medium.clone());
        cache.save(2, ArtifactContent::Mcq(vec![question("A")]), None);

        let raw = medium.get("smartstudy_ai:2:mcq").unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["materialId"], json!(2));
        assert_eq!(value["tool"], json!("mcq"));
        assert_eq!(value["content"][0]["question"], json!("A"));
        assert_eq!(value["meta"]["createdAt"], json!("2026-03-01T09:00:00Z"));
        assert!(value["meta"].get("params").is_none());
    }

    #[test]
    fn write_fault_is_swallowed_but_entry_returned() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set_available(false);
        let cache = cache_with(medium.clone());

        let entry = cache.save(4, ArtifactContent::Explanation("why".to_string()), None);
        assert_eq!(entry.tool(), Tool::Explain);

        medium.set_available(true);
        assert_eq!(cache.load(4, Tool::Explain), None);
    }

    #[test]
    fn try_save_reports_quota_fault() {
        let cache = cache_with(Arc::new(MemoryMedium::with_quota(32)));
        let err = cache
            .try_save(
                1,
                ArtifactContent::Summary("x".repeat(64)),
                SaveMeta::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StorageFault::Unavailable(_)));
    }

    #[test]
    fn read_fault_degrades_to_absent() {
        let medium = Arc::new(MemoryMedium::new());
        let cache = cache_with(medium.clone());
        cache.save(5, ArtifactContent::Summary("s".to_string()), None);

        medium.set_available(false);
        assert!(cache.try_load(5, Tool::Summary).is_err());
        assert_eq!(cache.load(5, Tool::Summary), None);
    }

    #[test]
    fn corrupt_json_degrades_to_absent() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set("smartstudy_ai:6:summary", "{not json").unwrap();
        let cache = cache_with(medium);

        assert!(matches!(
            cache.try_load(6, Tool::Summary),
            Err(StorageFault::Json { .. })
        ));
        assert_eq!(cache.load(6, Tool::Summary), None);
    }

    #[test]
    fn mismatched_identity_is_rejected() {
        let medium = Arc::new(MemoryMedium::new());
        let cache = cache_with(medium.clone());
        cache.save(7, ArtifactContent::Summary("seven".to_string()), None);

        let foreign = medium.get("smartstudy_ai:7:summary").unwrap().unwrap();
        medium.set("smartstudy_ai:8:summary", &foreign).unwrap();

        assert!(matches!(
            cache.try_load(8, Tool::Summary),
            Err(StorageFault::Corrupt { .. })
        ));
        assert_eq!(cache.load(8, Tool::Summary), None);
    }

    #[test]
    fn content_with_wrong_shape_is_rejected() {
        let medium = Arc::new(MemoryMedium::new());
        let raw = json!({
            "materialId": 9,
            "tool": "flashcards",
            "content": "not a list",
            "meta": { "createdAt": "2026-03-01T09:00:00Z" }
        });
        medium
            .set("smartstudy_ai:9:flashcards", &raw.to_string())
            .unwrap();
        let cache = cache_with(medium);

        assert_eq!(cache.load(9, Tool::Flashcards), None);
    }

    #[test]
    fn clear_missing_entry_is_not_an_error() {
        let cache = cache_with(Arc::new(MemoryMedium::new()));
        assert!(cache.try_clear(10, Tool::Mcq).is_ok());
        cache.clear(10, Tool::Mcq);
    }

    #[test]
    fn cache_key_round_trips() {
        for tool in Tool::ALL {
            let key = cache_key(42, tool);
            assert_eq!(parse_cache_key(&key), Some((42, tool)));
        }
        assert_eq!(cache_key(3, Tool::Flashcards), "smartstudy_ai:3:flashcards");
        assert_eq!(parse_cache_key("smartstudy_session_active"), None);
        assert_eq!(parse_cache_key("smartstudy_ai:x:summary"), None);
    }

    #[test]
    fn cache_keys_do_not_collide() {
        let mut keys = std::collections::HashSet::new();
        for material_id in [1, 2, 11, 12, 111] {
            for tool in Tool::ALL {
                assert!(keys.insert(cache_key(material_id, tool)));
            }
        }
    }

    #[test]
    fn tool_parses_from_id() {
        assert_eq!("mcq".parse::<Tool>(), Ok(Tool::Mcq));
        assert_eq!("explain".parse::<Tool>(), Ok(Tool::Explain));
        assert!("quiz".parse::<Tool>().is_err());
    }
}
