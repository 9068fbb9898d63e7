//! Constants for the download module (timeouts, chunking, pacing).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout between body reads (5 minutes for slow origins).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Size of each write to the destination file.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Minimum wall-clock gap between two progress events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// How often a paused transfer (or a backoff sleep) re-checks its control state.
pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
