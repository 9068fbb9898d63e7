//! Shared state of one transfer.
//!
//! A [`TransferSession`] is written by exactly one engine task and read by
//! any number of controllers. All fields that change are atomics, so control
//! requests and [`TransferSession::snapshot`] never wait on the engine.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use super::constants::CONTROL_POLL_INTERVAL;

/// Sentinel stored in `total_bytes` while the origin has not reported a length.
const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Lifecycle state of a transfer.
///
/// Only `Running ⇄ Paused` moves back and forth; the other three are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlState {
    /// Transfer is (or is about to be) moving bytes.
    Running = 0,
    /// Transfer is parked at a chunk boundary until resumed or cancelled.
    Paused = 1,
    /// Stopped at the caller's request; the partial file is kept.
    Cancelled = 2,
    /// Every byte of the resource is on disk.
    Completed = 3,
    /// Stopped by an error.
    Failed = 4,
}

impl ControlState {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            2 => Self::Cancelled,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a session, safe to hand to any thread.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// URL being downloaded.
    pub source_url: String,
    /// File the bytes land in.
    pub destination: PathBuf,
    /// Bytes on disk, resume offset included.
    pub bytes_transferred: u64,
    /// Bytes received from the network by this session (resume offset excluded).
    pub bytes_received: u64,
    /// Full resource size, once the origin has reported it.
    pub total_bytes: Option<u64>,
    /// Current lifecycle state.
    pub state: ControlState,
    /// Time since the first request went out, if it has.
    pub elapsed: Option<Duration>,
}

impl SessionSnapshot {
    /// Completion percentage in `0.0..=100.0`, or `None` while the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(100.0);
        }
        Some((self.bytes_transferred as f64 / total as f64 * 100.0).min(100.0))
    }

    /// Average rate in bytes per second since the first request.
    ///
    /// Counts every byte on disk, so a resumed transfer includes its offset.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> f64 {
        let Some(elapsed) = self.elapsed else {
            return 0.0;
        };
        let secs = elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.bytes_transferred as f64 / secs
    }
}

/// Authoritative state of one download.
#[derive(Debug)]
pub struct TransferSession {
    source_url: String,
    destination: PathBuf,
    bytes_transferred: AtomicU64,
    bytes_received: AtomicU64,
    total_bytes: AtomicU64,
    state: AtomicU8,
    started_at: OnceLock<Instant>,
}

impl TransferSession {
    /// Creates a running session for `source_url` landing at `destination`.
    pub fn new(source_url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            destination: destination.into(),
            bytes_transferred: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            total_bytes: AtomicU64::new(UNKNOWN_TOTAL),
            state: AtomicU8::new(ControlState::Running as u8),
            started_at: OnceLock::new(),
        }
    }

    /// URL being downloaded.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// File the bytes land in.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ControlState {
        ControlState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Bytes on disk, resume offset included.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::SeqCst)
    }

    /// Bytes received from the network by this session.
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::SeqCst)
    }

    /// Full resource size, once known.
    #[must_use]
    pub fn total_bytes(&self) -> Option<u64> {
        match self.total_bytes.load(Ordering::SeqCst) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }

    /// Asks a running transfer to park at the next chunk boundary.
    ///
    /// Ignored unless the session is `Running`.
    pub fn request_pause(&self) {
        if self.transition(ControlState::Running, ControlState::Paused) {
            debug!(url = %self.source_url, "pause requested");
        }
    }

    /// Lets a paused transfer continue.
    ///
    /// Ignored unless the session is `Paused`.
    pub fn request_resume(&self) {
        if self.transition(ControlState::Paused, ControlState::Running) {
            debug!(url = %self.source_url, "resume requested");
        }
    }

    /// Stops the transfer at the next chunk boundary. Irreversible.
    ///
    /// Wins over a pending pause; ignored once the session is terminal.
    pub fn request_cancel(&self) {
        let changed = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (!ControlState::from_u8(raw).is_terminal())
                    .then_some(ControlState::Cancelled as u8)
            })
            .is_ok();
        if changed {
            debug!(url = %self.source_url, "cancel requested");
        }
    }

    /// Returns an immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_url: self.source_url.clone(),
            destination: self.destination.clone(),
            bytes_transferred: self.bytes_transferred(),
            bytes_received: self.bytes_received(),
            total_bytes: self.total_bytes(),
            state: self.state(),
            elapsed: self.started_at.get().map(Instant::elapsed),
        }
    }

    fn transition(&self, from: ControlState, to: ControlState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    // ---- engine side -------------------------------------------------------

    /// Stamps the start time; later calls keep the first stamp.
    pub(crate) fn mark_started(&self) {
        self.started_at.get_or_init(Instant::now);
    }

    /// Sets the on-disk byte count at the start of an attempt.
    pub(crate) fn set_resume_offset(&self, offset: u64) {
        self.bytes_transferred.store(offset, Ordering::SeqCst);
    }

    /// Accounts for a chunk that has been written and flushed.
    pub(crate) fn record_written(&self, len: u64) {
        self.bytes_transferred.fetch_add(len, Ordering::SeqCst);
        self.bytes_received.fetch_add(len, Ordering::SeqCst);
    }

    /// Records the resource size. Once set, a different size is rejected and
    /// the stored one is returned as the error.
    pub(crate) fn resolve_total(&self, total: u64) -> Result<(), u64> {
        match self.total_bytes.compare_exchange(
            UNKNOWN_TOTAL,
            total,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(()),
            Err(existing) if existing == total => Ok(()),
            Err(existing) => Err(existing),
        }
    }

    /// Moves to a terminal state unless one was already reached, and returns
    /// the terminal state that holds afterwards.
    pub(crate) fn finish(&self, outcome: ControlState) -> ControlState {
        debug_assert!(outcome.is_terminal());
        match self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (!ControlState::from_u8(raw).is_terminal()).then_some(outcome as u8)
            }) {
            Ok(_) => outcome,
            Err(current) => ControlState::from_u8(current),
        }
    }

    /// Blocks while paused, polling on a fixed interval, and returns the
    /// state that ended the wait (`Running` or a terminal state).
    pub(crate) async fn wait_while_paused(&self) -> ControlState {
        loop {
            let state = self.state();
            if state != ControlState::Paused {
                return state;
            }
            tokio::time::sleep(CONTROL_POLL_INTERVAL).await;
        }
    }

    /// Sleeps for `delay` in poll-sized slices. Returns false as soon as the
    /// session is cancelled.
    pub(crate) async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            if self.state() == ControlState::Cancelled {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(CONTROL_POLL_INTERVAL)).await;
        }
    }

    /// Resolves once the session is cancelled, checking every poll interval.
    pub(crate) async fn cancelled(&self) {
        while self.state() != ControlState::Cancelled {
            tokio::time::sleep(CONTROL_POLL_INTERVAL).await;
        }
    }
}
