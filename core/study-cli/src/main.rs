//! smartstudy: command-line client for SmartStudy study sessions.
//!
//! Drives the client persistence core against the SmartStudy API and the local
//! store under `~/.smartstudy` (or `SMARTSTUDY_HOME`).
//!
//! ## Subcommands
//!
//! - `session`: start, end, inspect, or watch the single active study session
//! - `cache`: show, save, or clear cached AI results per material and tool

mod api_client;
mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use study_core::{StorageConfig, Tool};

#[derive(Parser)]
#[command(name = "smartstudy")]
#[command(about = "SmartStudy study session and AI result cache client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the active study session
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Inspect or edit cached AI results
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Start a session for a material (no-op if one is already active)
    Start {
        #[arg(value_name = "MATERIAL_ID")]
        material_id: i64,
    },

    /// End the active session
    End,

    /// Show the current phase and elapsed time
    Status,

    /// Show a live timer until the session ends or Ctrl-C
    Watch,

    /// Forget the local session without contacting the server
    Reset,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print a cached result
    Show {
        #[arg(value_name = "MATERIAL_ID")]
        material_id: i64,

        /// summary, flashcards, mcq, or explain
        #[arg(value_name = "TOOL")]
        tool: Tool,
    },

    /// Store a result (text for summary/explain, JSON for flashcards/mcq)
    Save {
        #[arg(value_name = "MATERIAL_ID")]
        material_id: i64,

        #[arg(value_name = "TOOL")]
        tool: Tool,

        /// Inline content
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read content from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Model that produced the result
        #[arg(long)]
        model: Option<String>,

        /// Generation parameter, repeatable (e.g. --param num_questions=5)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Remove a cached result
    Clear {
        #[arg(value_name = "MATERIAL_ID")]
        material_id: i64,

        #[arg(value_name = "TOOL")]
        tool: Tool,
    },
}

fn main() -> ExitCode {
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::run(cli.command, storage)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "smartstudy command failed");
            ExitCode::FAILURE
        }
    }
}
