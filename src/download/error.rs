//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns, so the message of the
//! terminal `Failed` event is readable without any further context.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a transfer attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (429/503 responses).
        retry_after: Option<String>,
    },

    /// File system error (create directory, open, write, flush).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The body ended before the declared length was reached.
    #[error("connection closed early downloading {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Incomplete {
        /// The URL being downloaded.
        url: String,
        /// Declared total size in bytes.
        expected_bytes: u64,
        /// Bytes on disk when the body ended.
        actual_bytes: u64,
    },

    /// The body carried more bytes than the declared length.
    #[error("server sent more than the declared {expected_bytes} bytes for {url}")]
    Overrun {
        /// The URL being downloaded.
        url: String,
        /// Declared total size in bytes.
        expected_bytes: u64,
    },

    /// Response headers contradict the request (bad range, unparsable header).
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The URL being downloaded.
        url: String,
        /// What was wrong with the response.
        reason: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a network or timeout error from a reqwest error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a short-body error.
    pub fn incomplete(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Incomplete {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an overlong-body error.
    pub fn overrun(url: impl Into<String>, expected_bytes: u64) -> Self {
        Self::Overrun {
            url: url.into(),
            expected_bytes,
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns the raw Retry-After header value, if the server sent one.
    #[must_use]
    pub fn retry_after(&self) -> Option<&str> {
        match self {
            Self::HttpStatus { retry_after, .. } => retry_after.as_deref(),
            _ => None,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>` impls: every variant
// needs the url or path that the source error does not carry.
