//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumable HTTP downloads and folder size reports.
///
/// `get` resumes from an existing partial file, retries transient failures,
/// and can be paused, resumed or cancelled from the keyboard while it runs.
#[derive(Parser, Debug)]
#[command(name = "dlkit")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL, resuming any partial file at the destination
    Get(GetArgs),
    /// List the subfolders of a directory with their total sizes
    Scan(ScanArgs),
}

/// Arguments for `dlkit get`.
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// URL to download (http or https)
    pub url: String,

    /// Destination file (default: last URL segment inside the output directory)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Maximum attempts for transient failures (1-10, default 3)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Do not read pause/resume/cancel commands from stdin
    #[arg(long)]
    pub no_input: bool,
}

/// Arguments for `dlkit scan`.
#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Directory whose subfolders are measured
    pub path: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
