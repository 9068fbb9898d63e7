//! CLI entry point for dlkit.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod app_config;
mod cli;

use app::{runtime, terminal};
use cli::Args;

/// Process-level result of a run, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Download completed or command succeeded.
    Success,
    /// Download failed.
    Failure,
    /// Download cancelled by the user (same code as SIGINT).
    Cancelled,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Cancelled => 130,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    terminal::init_tracing(terminal::resolve_default_log_level(args.verbose, args.quiet));
    debug!(?args, "CLI arguments parsed");

    let exit = runtime::run_dlkit(args).await?;
    Ok(ExitCode::from(exit.code()))
}
