use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dlkit::download::{
    TransferEvent, constants::CONNECT_TIMEOUT_SECS, constants::READ_TIMEOUT_SECS,
    filename_from_url,
};
use dlkit::{DEFAULT_MAX_RETRIES, HttpClient, Outcome, RetryPolicy, TransferEngine};
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::controls::{self, ControlCommand};
use crate::app::progress_manager::TransferProgress;
use crate::app::{exit_handler, terminal};
use crate::app_config::{self, FileConfig};
use crate::cli::{Args, Command, GetArgs, ScanArgs};

/// Effective settings for one `get` run after merging CLI flags, the config
/// file and built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GetSettings {
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
    pub(crate) max_attempts: u32,
    pub(crate) base_delay: Option<Duration>,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
}

pub(crate) fn resolve_get_settings(args: &GetArgs, file: &FileConfig) -> GetSettings {
    let destination = args.output.clone().unwrap_or_else(|| {
        let dir = file.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        dir.join(filename_from_url(&args.url))
    });

    GetSettings {
        url: args.url.clone(),
        destination,
        max_attempts: args
            .max_retries
            .or(file.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
        base_delay: file.retry_base_delay_ms.map(Duration::from_millis),
        connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    }
}

pub(crate) async fn run_dlkit(args: Args) -> Result<ProcessExit> {
    match args.command {
        Command::Get(get) => run_get(&get, args.quiet).await,
        Command::Scan(scan) => run_scan(&scan),
    }
}

async fn run_get(args: &GetArgs, quiet: bool) -> Result<ProcessExit> {
    let loaded = app_config::load_default_file_config()?;
    if loaded.loaded_from_file
        && let Some(path) = loaded.path.as_deref()
    {
        debug!(path = %path.display(), "loaded config file");
    }
    let settings = resolve_get_settings(args, &loaded.file_config());
    debug!(?settings, "resolved download settings");

    let client = HttpClient::new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    );
    let mut policy = RetryPolicy::with_max_attempts(settings.max_attempts);
    if let Some(base_delay) = settings.base_delay {
        policy = policy.with_base_delay(base_delay);
    }

    let engine = TransferEngine::new(client, policy);
    let mut handle = engine.start(settings.url.clone(), settings.destination.clone());

    let progress = TransferProgress::new(
        terminal::should_use_progress_bar(
            io::stderr().is_terminal(),
            quiet,
            terminal::is_dumb_terminal(),
        ),
        display_name(&settings.destination),
    );
    let interactive = !args.no_input;
    if interactive && io::stdin().is_terminal() && progress.is_enabled() {
        eprintln!("Type p (pause), r (resume) or c (cancel) and press Enter.");
    }
    let mut commands = if interactive {
        Some(controls::spawn_stdin_reader())
    } else {
        None
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_seen = false;

    let terminal = loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(TransferEvent::Progress(report)) => progress.update(&report),
                Some(TransferEvent::Terminal(terminal)) => break terminal,
                None => break dlkit::TerminalEvent {
                    outcome: Outcome::Failed,
                    message: "transfer task stopped without reporting an outcome".to_string(),
                },
            },
            command = recv_command(&mut commands) => match command {
                Some(command) => {
                    match command {
                        ControlCommand::Pause => handle.pause(),
                        ControlCommand::Resume => handle.resume(),
                        ControlCommand::Cancel => handle.cancel(),
                    }
                    progress.note(command.as_str());
                }
                None => commands = None,
            },
            _ = &mut ctrl_c, if !ctrl_c_seen => {
                ctrl_c_seen = true;
                info!("interrupt received, cancelling");
                handle.cancel();
            }
        }
    };

    progress.finish(&terminal);
    match terminal.outcome {
        Outcome::Failed => eprintln!("Download failed: {}", terminal.message),
        Outcome::Completed | Outcome::Cancelled if !quiet => {
            eprintln!("{}", capitalize(&terminal.message));
        }
        _ => {}
    }

    Ok(exit_handler::determine_exit_outcome(terminal.outcome))
}

/// Waits for the next stdin command; pends forever once input is closed.
async fn recv_command(
    commands: &mut Option<tokio::sync::mpsc::UnboundedReceiver<ControlCommand>>,
) -> Option<ControlCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn run_scan(args: &ScanArgs) -> Result<ProcessExit> {
    let report = dlkit::scan(&args.path)
        .with_context(|| format!("Failed to scan '{}'", args.path.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode scan report")?;
        println!("{json}");
    } else {
        print!("{report}");
    }
    Ok(ProcessExit::Success)
}

fn display_name(destination: &Path) -> String {
    match destination.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => destination.display().to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
