//! Transfer engine: runs one download per background task.
//!
//! [`TransferEngine::start`] creates a [`TransferSession`], spawns a Tokio
//! task that drives it, and returns a [`DownloadHandle`]. The task posts
//! [`TransferEvent`]s over an unbounded channel: any number of throttled
//! progress events followed by exactly one terminal event.
//!
//! # Example
//!
//! ```no_run
//! use dlkit::download::{TransferEngine, TransferEvent};
//!
//! # async fn example() {
//! let engine = TransferEngine::default();
//! let mut handle = engine.start("https://example.com/big.iso", "./downloads/big.iso");
//!
//! while let Some(event) = handle.next_event().await {
//!     match event {
//!         TransferEvent::Progress(report) => println!("{report}"),
//!         TransferEvent::Terminal(done) => println!("{}: {}", done.outcome, done.message),
//!     }
//! }
//! # }
//! ```

mod attempt;
mod retrying;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::constants::PROGRESS_INTERVAL;
use super::progress::{ProgressReport, ProgressThrottle, format_size};
use super::retry::RetryPolicy;
use super::session::{ControlState, SessionSnapshot, TransferSession};
use super::HttpClient;

/// Final outcome of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every byte is on disk.
    Completed,
    /// Stopped at the caller's request; the partial file is kept.
    Cancelled,
    /// Stopped by an error.
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        })
    }
}

impl From<Outcome> for ControlState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => Self::Completed,
            Outcome::Cancelled => Self::Cancelled,
            Outcome::Failed => Self::Failed,
        }
    }
}

/// The single event that ends a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEvent {
    /// How the transfer ended.
    pub outcome: Outcome,
    /// Human-readable summary or failure cause.
    pub message: String,
}

/// Notification posted by the engine task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Live progress; never posted after the terminal event.
    Progress(ProgressReport),
    /// The transfer ended; always the last event.
    Terminal(TerminalEvent),
}

/// How an attempt (or the whole retry run) stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Completed,
    Cancelled,
}

/// Posts throttled progress events for one session.
#[derive(Debug)]
struct ProgressReporter {
    events: mpsc::UnboundedSender<TransferEvent>,
    throttle: Mutex<ProgressThrottle>,
}

impl ProgressReporter {
    fn new(events: mpsc::UnboundedSender<TransferEvent>) -> Self {
        Self {
            events,
            throttle: Mutex::new(ProgressThrottle::new(PROGRESS_INTERVAL)),
        }
    }

    /// Posts a progress event unless one went out less than an interval ago.
    fn maybe_emit(&self, session: &TransferSession) {
        let due = self
            .throttle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready(Instant::now());
        if due {
            self.emit(session);
        }
    }

    /// Posts a progress event regardless of the throttle.
    fn emit(&self, session: &TransferSession) {
        let report = ProgressReport::from_snapshot(&session.snapshot());
        // A dropped receiver only means nobody is listening any more.
        let _ = self.events.send(TransferEvent::Progress(report));
    }
}

/// Starts transfers and owns the settings they share.
#[derive(Debug, Clone, Default)]
pub struct TransferEngine {
    client: HttpClient,
    retry_policy: RetryPolicy,
}

impl TransferEngine {
    /// Creates an engine that downloads with `client` and retries per `retry_policy`.
    #[must_use]
    pub fn new(client: HttpClient, retry_policy: RetryPolicy) -> Self {
        debug!(
            max_attempts = retry_policy.max_attempts(),
            base_delay_ms = retry_policy.base_delay().as_millis(),
            "creating transfer engine"
        );
        Self {
            client,
            retry_policy,
        }
    }

    /// Starts downloading `source_url` into `destination` on a background task.
    ///
    /// An existing file at `destination` is treated as a partial download and
    /// resumed. Never blocks; progress and the outcome arrive through the
    /// returned handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[instrument(skip(self, source_url, destination))]
    pub fn start(
        &self,
        source_url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> DownloadHandle {
        let session = Arc::new(TransferSession::new(source_url, destination));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            url = %session.source_url(),
            path = %session.destination().display(),
            "starting download"
        );

        tokio::spawn(drive(
            self.client.clone(),
            self.retry_policy.clone(),
            Arc::clone(&session),
            events_tx,
        ));

        DownloadHandle {
            session,
            events: events_rx,
        }
    }
}

/// Body of the background task. Always posts exactly one terminal event.
async fn drive(
    client: HttpClient,
    retry_policy: RetryPolicy,
    session: Arc<TransferSession>,
    events: mpsc::UnboundedSender<TransferEvent>,
) {
    let reporter = ProgressReporter::new(events.clone());

    let run = retrying::with_retry(&retry_policy, &session, |_attempt| {
        attempt::run(&client, &session, &reporter)
    });
    let result = std::panic::AssertUnwindSafe(run).catch_unwind().await;

    let terminal = match result {
        Ok(Ok(Finish::Completed)) => match session.finish(ControlState::Completed) {
            ControlState::Completed => {
                reporter.emit(&session);
                completed_event(&session.snapshot())
            }
            _ => cancelled_event(&session.snapshot()),
        },
        Ok(Ok(Finish::Cancelled)) => {
            session.finish(ControlState::Cancelled);
            cancelled_event(&session.snapshot())
        }
        Ok(Err(err)) => match session.finish(ControlState::Failed) {
            ControlState::Failed => {
                warn!(url = %session.source_url(), error = %err, "download failed");
                TerminalEvent {
                    outcome: Outcome::Failed,
                    message: err.to_string(),
                }
            }
            _ => cancelled_event(&session.snapshot()),
        },
        Err(panic) => {
            let cause = panic_message(panic.as_ref());
            error!(url = %session.source_url(), cause = %cause, "download task panicked");
            panicked_event(&session, &cause)
        }
    };

    debug!(outcome = %terminal.outcome, "posting terminal event");
    let _ = events.send(TransferEvent::Terminal(terminal));
}

/// Terminal event for a task that panicked. A cancel that landed first wins.
fn panicked_event(session: &TransferSession, cause: &str) -> TerminalEvent {
    match session.finish(ControlState::Failed) {
        ControlState::Failed => TerminalEvent {
            outcome: Outcome::Failed,
            message: format!("internal error: {cause}"),
        },
        _ => cancelled_event(&session.snapshot()),
    }
}

fn completed_event(snapshot: &SessionSnapshot) -> TerminalEvent {
    info!(
        path = %snapshot.destination.display(),
        bytes = snapshot.bytes_transferred,
        "download complete"
    );
    TerminalEvent {
        outcome: Outcome::Completed,
        message: format!(
            "downloaded {} to {}",
            format_size(snapshot.bytes_transferred),
            snapshot.destination.display()
        ),
    }
}

fn cancelled_event(snapshot: &SessionSnapshot) -> TerminalEvent {
    info!(
        path = %snapshot.destination.display(),
        bytes = snapshot.bytes_transferred,
        "download cancelled"
    );
    TerminalEvent {
        outcome: Outcome::Cancelled,
        message: format!(
            "cancelled after {}; partial file kept at {}",
            format_size(snapshot.bytes_transferred),
            snapshot.destination.display()
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Caller's side of a running transfer.
///
/// Control methods are fire-and-forget and may be called at any time, also
/// after the transfer ended (they are then ignored).
#[derive(Debug)]
pub struct DownloadHandle {
    session: Arc<TransferSession>,
    events: mpsc::UnboundedReceiver<TransferEvent>,
}

impl DownloadHandle {
    /// Asks the transfer to pause at the next chunk boundary.
    pub fn pause(&self) {
        self.session.request_pause();
    }

    /// Lets a paused transfer continue.
    pub fn resume(&self) {
        self.session.request_resume();
    }

    /// Stops the transfer at the next chunk boundary, keeping the partial file.
    pub fn cancel(&self) {
        self.session.request_cancel();
    }

    /// Returns a copy of the session's current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Returns the shared session, e.g. to control it from another task.
    #[must_use]
    pub fn session(&self) -> Arc<TransferSession> {
        Arc::clone(&self.session)
    }

    /// Waits for the next event. Returns `None` after the terminal event
    /// has been received.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Drains events until the terminal one and returns it.
    pub async fn wait(mut self) -> TerminalEvent {
        while let Some(event) = self.next_event().await {
            if let TransferEvent::Terminal(terminal) = event {
                return terminal;
            }
        }
        TerminalEvent {
            outcome: Outcome::Failed,
            message: "transfer task stopped without reporting an outcome".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Completed.to_string(), "completed");
        assert_eq!(Outcome::Cancelled.to_string(), "cancelled");
        assert_eq!(Outcome::Failed.to_string(), "failed");
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_panic_after_cancel_reports_cancelled() {
        let session = TransferSession::new("https://example.com/a", "/tmp/a");
        session.request_cancel();
        let terminal = panicked_event(&session, "boom");
        assert_eq!(terminal.outcome, Outcome::Cancelled);
        assert_eq!(session.snapshot().state, ControlState::Cancelled);
    }

    #[test]
    fn test_panic_while_running_reports_failed() {
        let session = TransferSession::new("https://example.com/a", "/tmp/a");
        let terminal = panicked_event(&session, "boom");
        assert_eq!(terminal.outcome, Outcome::Failed);
        assert_eq!(terminal.message, "internal error: boom");
        assert_eq!(session.snapshot().state, ControlState::Failed);
    }

    #[test]
    fn test_reporter_throttles_but_emit_always_posts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        let session = TransferSession::new("https://example.com/a", "/tmp/a");

        reporter.maybe_emit(&session);
        reporter.maybe_emit(&session);
        reporter.emit(&session);

        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, TransferEvent::Progress(_)));
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_retry() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = TransferEngine::default();
        let handle = engine.start("not a url", dir.path().join("out.bin"));
        let terminal = handle.wait().await;
        assert_eq!(terminal.outcome, Outcome::Failed);
        assert!(terminal.message.contains("invalid URL"), "{}", terminal.message);
    }

    #[tokio::test]
    async fn test_controls_after_terminal_are_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = TransferEngine::default();
        let mut handle = engine.start("not a url", dir.path().join("out.bin"));
        while let Some(event) = handle.next_event().await {
            if matches!(event, TransferEvent::Terminal(_)) {
                break;
            }
        }
        handle.cancel();
        handle.pause();
        handle.resume();
        assert_eq!(handle.snapshot().state, ControlState::Failed);
        assert!(handle.next_event().await.is_none());
    }
}
