//! Subcommand handlers.
//!
//! Each handler opens the engine, performs one operation, and prints a short
//! human-readable result. Formatting lives in small pure functions so it can be
//! tested without a terminal.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use smartstudy_protocol::{
    ExplainResponse, Flashcard, FlashcardsResponse, McqQuestion, McqResponse, SummaryResponse,
};
use study_core::elapsed::{derive, elapsed_seconds};
use study_core::{
    format_label, human_time, load_study_config, ActiveSession, ArtifactContent, CachedArtifact,
    ElapsedTicker, RemoteError, SaveMeta, SessionPhase, SessionSnapshot, StorageConfig,
    StudyEngine, StudyError, Tool, SESSION_STORAGE_KEY,
};

use crate::api_client::HttpSessionApi;
use crate::{CacheCommand, Commands, SessionCommand};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Study(#[from] StudyError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid {what}: {details}")]
    InvalidInput { what: &'static str, details: String },
}

impl CliError {
    fn invalid(what: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidInput {
            what,
            details: details.into(),
        }
    }
}

pub async fn run(command: Commands, storage: StorageConfig) -> Result<(), CliError> {
    let config = load_study_config(&storage).with_env_overrides();
    let api = Arc::new(HttpSessionApi::from_config(&config));
    let engine = StudyEngine::open(storage, config, api)?;

    match command {
        Commands::Session { action } => run_session(&engine, action).await,
        Commands::Cache { action } => run_cache(&engine, action),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

async fn run_session(engine: &StudyEngine, action: SessionCommand) -> Result<(), CliError> {
    let sessions = engine.sessions();
    match action {
        SessionCommand::Start { material_id } => {
            if material_id <= 0 {
                return Err(CliError::invalid("material id", "must be positive"));
            }
            match sessions.start(material_id).await? {
                Some(session) => println!(
                    "Started session {} for material {}",
                    session.id, session.material_id
                ),
                None => match sessions.active_session() {
                    Some(active) => println!(
                        "Session {} is already active for material {}",
                        active.id, active.material_id
                    ),
                    None => println!("A session change is already in progress"),
                },
            }
        }
        SessionCommand::End => match sessions.end().await? {
            Some(ended) => println!("Ended session {} after {}", ended.id, ended_duration(&ended)),
            None => println!("No active session"),
        },
        SessionCommand::Status => {
            println!("{}", status_line(&sessions.snapshot(), engine.clock().sample()));
        }
        SessionCommand::Watch => watch(engine).await?,
        SessionCommand::Reset => {
            sessions.set_active(None);
            println!("Local session cleared");
        }
    }
    Ok(())
}

async fn watch(engine: &StudyEngine) -> Result<(), CliError> {
    let Some(session) = engine.sessions().active_session() else {
        println!("No active session");
        return Ok(());
    };
    println!(
        "Watching session {} on material {} (Ctrl-C to stop)",
        session.id, session.material_id
    );

    let (mut elapsed, ticker) = ElapsedTicker::spawn(
        engine.clock(),
        engine.sessions().subscribe(),
        SessionSnapshot::start_time,
    );
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            changed = elapsed.changed() => {
                if changed.is_err() {
                    break;
                }
                let label = elapsed.borrow_and_update().label.clone();
                write!(stdout, "\r{}   ", label)?;
                stdout.flush()?;
                if ended_elsewhere(engine) {
                    engine.sessions().set_active(None);
                    println!("\nSession ended");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                println!();
                break;
            }
        }
    }

    ticker.abort();
    Ok(())
}

/// Another process ended the session and removed the persisted copy.
fn ended_elsewhere(engine: &StudyEngine) -> bool {
    matches!(engine.medium().get(SESSION_STORAGE_KEY), Ok(None))
}

fn status_line(snapshot: &SessionSnapshot, now: DateTime<Utc>) -> String {
    let Some(session) = &snapshot.active else {
        return match snapshot.phase() {
            SessionPhase::Starting => "Starting session...".to_string(),
            _ => "No active session".to_string(),
        };
    };
    let elapsed = derive(Some(session.start_time), now);
    format!(
        "Session {} on material {}: {} (started {}, {})",
        session.id,
        session.material_id,
        elapsed.label,
        session.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.phase()
    )
}

fn ended_duration(session: &ActiveSession) -> String {
    match (session.duration_minutes, session.end_time) {
        (Some(minutes), _) if minutes > 0 => format!("{} min", minutes),
        (_, Some(end_time)) => format_label(elapsed_seconds(session.start_time, end_time)),
        (Some(minutes), None) => format!("{} min", minutes),
        (None, None) => "an unknown duration".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════════════

fn run_cache(engine: &StudyEngine, action: CacheCommand) -> Result<(), CliError> {
    let cache = engine.cache();
    match action {
        CacheCommand::Show { material_id, tool } => match cache.load(material_id, tool) {
            Some(artifact) => print!("{}", render_artifact(&artifact, engine.clock().sample())),
            None => println!("No cached {} for material {}", tool, material_id),
        },
        CacheCommand::Save {
            material_id,
            tool,
            text,
            file,
            model,
            params,
        } => {
            let raw = read_content(text, file)?;
            let content = parse_content(tool, &raw)?;
            let meta = SaveMeta {
                model,
                params: parse_params(&params)?,
            };
            cache
                .try_save(material_id, content, meta)
                .map_err(StudyError::from)?;
            println!("Saved {} for material {}", tool, material_id);
        }
        CacheCommand::Clear { material_id, tool } => {
            cache.clear(material_id, tool);
            println!("Cleared {} for material {}", tool, material_id);
        }
    }
    Ok(())
}

fn read_content(text: Option<String>, file: Option<PathBuf>) -> Result<String, CliError> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(fs_err::read_to_string(path)?),
        (None, None) => Err(CliError::invalid("content", "pass --text or --file")),
    }
}

/// Accepts a bare value or the API response wrapper for the tool.
fn parse_content(tool: Tool, raw: &str) -> Result<ArtifactContent, CliError> {
    match tool {
        Tool::Summary => Ok(ArtifactContent::Summary(
            serde_json::from_str::<SummaryResponse>(raw)
                .map(|response| response.summary)
                .unwrap_or_else(|_| raw.trim_end().to_string()),
        )),
        Tool::Explain => Ok(ArtifactContent::Explanation(
            serde_json::from_str::<ExplainResponse>(raw)
                .map(|response| response.explanation)
                .unwrap_or_else(|_| raw.trim_end().to_string()),
        )),
        Tool::Flashcards => serde_json::from_str::<Vec<Flashcard>>(raw)
            .or_else(|_| {
                serde_json::from_str::<FlashcardsResponse>(raw).map(|response| response.flashcards)
            })
            .map(ArtifactContent::Flashcards)
            .map_err(|err| CliError::invalid("flashcards JSON", err.to_string())),
        Tool::Mcq => serde_json::from_str::<Vec<McqQuestion>>(raw)
            .or_else(|_| serde_json::from_str::<McqResponse>(raw).map(|response| response.questions))
            .map(ArtifactContent::Mcq)
            .map_err(|err| CliError::invalid("mcq JSON", err.to_string())),
    }
}

/// `key=value` pairs; values that parse as JSON keep their type.
fn parse_params(pairs: &[String]) -> Result<Option<Map<String, Value>>, CliError> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut params = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| CliError::invalid("param", format!("expected KEY=VALUE, got {}", pair)))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(Some(params))
}

fn render_artifact(artifact: &CachedArtifact, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "{} for material {} (cached {}",
        artifact.tool(),
        artifact.material_id,
        human_time(artifact.meta.created_at, now)
    );
    if let Some(model) = &artifact.meta.model {
        out.push_str(&format!(", {}", model));
    }
    out.push_str(")\n\n");

    match &artifact.content {
        ArtifactContent::Summary(text) | ArtifactContent::Explanation(text) => {
            out.push_str(text);
            out.push('\n');
        }
        ArtifactContent::Flashcards(cards) => {
            for (index, card) in cards.iter().enumerate() {
                out.push_str(&format!(
                    "{}. Q: {}\n   A: {}\n",
                    index + 1,
                    card.question,
                    card.answer
                ));
            }
        }
        ArtifactContent::Mcq(questions) => {
            for (index, question) in questions.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", index + 1, question.question));
                for option in &question.options {
                    let mark = if option.is_correct { "x" } else { " " };
                    out.push_str(&format!("   [{}] {}\n", mark, option.text));
                }
            }
        }
    }
    out
}
