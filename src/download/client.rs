//! HTTP client wrapper for ranged downloads.
//!
//! [`HttpClient::fetch`] performs one GET, optionally with a
//! `Range: bytes=<offset>-` header, and sorts the response into a
//! [`FetchReply`] so the engine only deals with the three shapes a
//! resumable download can get back.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for streaming downloads.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Parsed `Content-Range` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the enclosed range, `None` for the `bytes */N` form.
    pub start: Option<u64>,
    /// Last byte (inclusive) of the enclosed range.
    pub end: Option<u64>,
    /// Full resource size, `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Successful outcomes of a download request.
#[derive(Debug)]
pub enum FetchReply {
    /// `200 OK`: the body is the whole resource.
    Full {
        /// Response whose body is still to be read.
        response: reqwest::Response,
        /// Declared body length.
        content_length: Option<u64>,
    },
    /// `206 Partial Content`: the body starts at `range.start`.
    Partial {
        /// Response whose body is still to be read.
        response: reqwest::Response,
        /// Declared range.
        range: ContentRange,
        /// Declared body length.
        content_length: Option<u64>,
    },
    /// `416 Range Not Satisfiable`: nothing lies at or beyond the requested offset.
    RangeNotSatisfiable {
        /// Full size reported by the server (`bytes */N`).
        total: Option<u64>,
    },
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes between body reads
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Issues a GET for `url`, asking for bytes from `resume_from` onward
    /// when it is non-zero.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid or not http(s)
    /// - The request fails (network error, timeout)
    /// - The server answers with any status other than 200, 206 or 416
    /// - A 206 response has no usable `Content-Range`
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, resume_from: u64) -> Result<FetchReply, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let mut request = self.client.get(parsed);
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        let content_length = header_u64(response.headers(), CONTENT_LENGTH.as_str());
        debug!(status = status.as_u16(), ?content_length, "response received");

        match status {
            StatusCode::OK => Ok(FetchReply::Full {
                response,
                content_length,
            }),
            StatusCode::PARTIAL_CONTENT => {
                let range = content_range(response.headers())
                    .filter(|range| range.start.is_some())
                    .ok_or_else(|| {
                        DownloadError::malformed(url, "206 response without a byte range")
                    })?;
                Ok(FetchReply::Partial {
                    response,
                    range,
                    content_length,
                })
            }
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(FetchReply::RangeNotSatisfiable {
                total: content_range(response.headers()).and_then(|range| range.total),
            }),
            _ => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(std::string::ToString::to_string);
                Err(DownloadError::http_status_with_retry_after(
                    url,
                    status.as_u16(),
                    retry_after,
                ))
            }
        }
    }
}

fn build_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .user_agent(user_agent::default_download_user_agent())
        .build()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn content_range(headers: &HeaderMap) -> Option<ContentRange> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Parses `bytes <start>-<end>/<total>`, `bytes <start>-<end>/*` and `bytes */<total>`.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = spec.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        raw => Some(raw.parse::<u64>().ok()?),
    };

    let (start, end) = match range.trim() {
        "*" => (None, None),
        raw => {
            let (start, end) = raw.split_once('-')?;
            let start = start.trim().parse::<u64>().ok()?;
            let end = end.trim().parse::<u64>().ok()?;
            if end < start || total.is_some_and(|total| end >= total) {
                return None;
            }
            (Some(start), Some(end))
        }
    };

    if start.is_none() && total.is_none() {
        return None;
    }

    Some(ContentRange { start, end, total })
}
