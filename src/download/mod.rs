//! Resumable HTTP download engine.
//!
//! # Features
//!
//! - Resumes from an existing partial file with `Range: bytes=<offset>-`
//! - Cooperative pause, resume and cancel at 8 KiB chunk boundaries
//! - Automatic retry of transient failures with exponential backoff
//! - Throttled progress events (percentage, sizes, throughput)
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use dlkit::download::{Outcome, TransferEngine};
//!
//! # async fn example() {
//! let engine = TransferEngine::default();
//! let handle = engine.start("https://example.com/big.iso", "./big.iso");
//! let done = handle.wait().await;
//! assert_eq!(done.outcome, Outcome::Completed);
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod progress;
mod retry;
mod session;

pub use client::{ContentRange, FetchReply, HttpClient, parse_content_range};
pub use engine::{DownloadHandle, Outcome, TerminalEvent, TransferEngine, TransferEvent};
pub use error::DownloadError;
pub use filename::{FALLBACK_FILENAME, filename_from_url};
pub use progress::{ProgressReport, ProgressThrottle, format_size, format_throughput};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after,
};
pub use session::{ControlState, SessionSnapshot, TransferSession};
