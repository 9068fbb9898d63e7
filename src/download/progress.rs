//! Progress reports and human-readable byte sizes.

use std::time::{Duration, Instant};

use super::session::SessionSnapshot;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count with binary (1024) scaling and two decimals.
///
/// ```
/// use dlkit::download::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    format_scaled(bytes as f64)
}

/// Formats a transfer rate, e.g. `"1.50 KB/s"`.
#[must_use]
pub fn format_throughput(bytes_per_second: f64) -> String {
    format!("{}/s", format_scaled(bytes_per_second.max(0.0)))
}

fn format_scaled(mut value: f64) -> String {
    if value == 0.0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", SIZE_UNITS[unit])
}

/// One progress event's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Completion in `0.0..=100.0`; `None` while the total is unknown.
    pub percent: Option<f64>,
    /// Bytes on disk.
    pub transferred: u64,
    /// Full size, when known.
    pub total: Option<u64>,
    /// `transferred` as text.
    pub transferred_text: String,
    /// `total` as text, `"unknown"` when not reported.
    pub total_text: String,
    /// Average rate as text, e.g. `"2.00 MB/s"`.
    pub throughput_text: String,
}

impl ProgressReport {
    /// Builds a report from a session snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            percent: snapshot.percent(),
            transferred: snapshot.bytes_transferred,
            total: snapshot.total_bytes,
            transferred_text: format_size(snapshot.bytes_transferred),
            total_text: snapshot
                .total_bytes
                .map_or_else(|| "unknown".to_string(), format_size),
            throughput_text: format_throughput(snapshot.bytes_per_second()),
        }
    }
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.percent {
            Some(percent) => write!(
                f,
                "{percent:.1}% {} / {} ({})",
                self.transferred_text, self.total_text, self.throughput_text
            ),
            None => write!(f, "{} ({})", self.transferred_text, self.throughput_text),
        }
    }
}

/// Rate limiter for progress events: at most one per `interval`.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Creates a throttle that lets the first event through immediately.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true (and records `now`) when an event may be emitted.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::download::session::ControlState;

    #[test]
    fn test_format_size_zero() {
        assert_eq!(format_size(0), "0 B");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(1), "1.00 B");
        assert_eq!(format_size(1023), "1023.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1_048_576), "1.00 MB");
        assert_eq!(format_size(1_073_741_824), "1.00 GB");
        assert_eq!(format_size(1_099_511_627_776), "1.00 TB");
    }

    #[test]
    fn test_format_size_caps_at_terabytes() {
        assert_eq!(format_size(1024 * 1_099_511_627_776), "1024.00 TB");
    }

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(0.0), "0 B/s");
        assert_eq!(format_throughput(1536.0), "1.50 KB/s");
        assert_eq!(format_throughput(-3.0), "0 B/s");
    }

    fn snapshot(transferred: u64, total: Option<u64>) -> SessionSnapshot {
        SessionSnapshot {
            source_url: "https://example.com/a".to_string(),
            destination: PathBuf::from("/tmp/a"),
            bytes_transferred: transferred,
            bytes_received: transferred,
            total_bytes: total,
            state: ControlState::Running,
            elapsed: Some(Duration::from_secs(2)),
        }
    }

    #[test]
    fn test_report_with_known_total() {
        let report = ProgressReport::from_snapshot(&snapshot(512, Some(2048)));
        assert_eq!(report.percent, Some(25.0));
        assert_eq!(report.transferred_text, "512.00 B");
        assert_eq!(report.total_text, "2.00 KB");
        assert_eq!(report.throughput_text, "256.00 B/s");
        assert_eq!(report.to_string(), "25.0% 512.00 B / 2.00 KB (256.00 B/s)");
    }

    #[test]
    fn test_report_with_unknown_total() {
        let report = ProgressReport::from_snapshot(&snapshot(2048, None));
        assert_eq!(report.percent, None);
        assert_eq!(report.total_text, "unknown");
        assert_eq!(report.to_string(), "2.00 KB (1.00 KB/s)");
    }

    #[test]
    fn test_throttle_limits_rate() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(50)));
        assert!(throttle.ready(start + Duration::from_millis(100)));
        assert!(!throttle.ready(start + Duration::from_millis(199)));
        assert!(throttle.ready(start + Duration::from_millis(250)));
    }
}
