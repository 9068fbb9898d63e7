//! Interactive pause/resume/cancel commands read from stdin.

use std::io::{self, BufRead};

use tokio::sync::mpsc;
use tracing::debug;

/// A control request typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlCommand {
    Pause,
    Resume,
    Cancel,
}

impl ControlCommand {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "paused",
            Self::Resume => "resumed",
            Self::Cancel => "cancelling",
        }
    }
}

/// Parses one input line. Accepts the single letters `p`, `r`, `c` and the
/// full words, case-insensitively; anything else is ignored.
pub(crate) fn parse_control(line: &str) -> Option<ControlCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(ControlCommand::Pause),
        "r" | "resume" => Some(ControlCommand::Resume),
        "c" | "cancel" => Some(ControlCommand::Cancel),
        _ => None,
    }
}

/// Reads stdin lines on a detached thread and forwards recognized commands.
///
/// A plain thread keeps a blocked stdin read from holding up runtime
/// shutdown. The channel closes at end of input.
pub(crate) fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<ControlCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_control(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => debug!(input = %line.trim(), "ignoring unknown control command"),
            }
        }
        debug!("stdin closed, interactive controls disabled");
    });
    rx
}
