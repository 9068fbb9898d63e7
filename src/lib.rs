//! dlkit Core Library
//!
//! This library provides a resumable HTTP download engine with cooperative
//! pause, resume and cancel, plus a small folder size scanner.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Transfer sessions, the transfer engine, retry and progress
//! - [`scan`] - Recursive size listing of a directory's subfolders

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod scan;
mod user_agent;

// Re-export commonly used types
pub use download::{
    ControlState, DEFAULT_MAX_RETRIES, DownloadError, DownloadHandle, FailureType, HttpClient,
    Outcome, ProgressReport, RetryDecision, RetryPolicy, SessionSnapshot, TerminalEvent,
    TransferEngine, TransferEvent, TransferSession, classify_error, format_size,
};
pub use scan::{ScanEntry, ScanError, ScanReport, scan};
