//! Progress UI (bar or spinner) for a single transfer.

use std::time::Duration;

use dlkit::{ProgressReport, TerminalEvent};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner} [{bar:30}] {msg}";
const SPINNER_TEMPLATE: &str = "{spinner} {msg}";

/// Renders progress events for one transfer on stderr.
///
/// Disabled instances accept every call and draw nothing, so callers need
/// no branching for quiet or non-interactive runs.
pub(crate) struct TransferProgress {
    bar: Option<ProgressBar>,
    label: String,
}

impl TransferProgress {
    pub(crate) fn new(enabled: bool, label: impl Into<String>) -> Self {
        let label = label.into();
        let bar = enabled.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_message(format!("{label}: connecting..."));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Self { bar, label }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.bar.is_some()
    }

    pub(crate) fn update(&self, report: &ProgressReport) {
        let Some(bar) = &self.bar else {
            return;
        };
        if let Some(total) = report.total
            && bar.length() != Some(total)
        {
            bar.set_length(total);
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
        }
        bar.set_position(report.transferred);
        bar.set_message(render_line(&self.label, report));
    }

    /// Shows a status note (paused, resumed, cancelling) next to the label.
    pub(crate) fn note(&self, status: &str) {
        match &self.bar {
            Some(bar) => bar.println(format!("{}: {status}", self.label)),
            None => tracing::info!(file = %self.label, "{status}"),
        }
    }

    pub(crate) fn finish(&self, terminal: &TerminalEvent) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        tracing::debug!(outcome = %terminal.outcome, "progress display closed");
    }
}

pub(crate) fn render_line(label: &str, report: &ProgressReport) -> String {
    format!("{label}: {report}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlkit::Outcome;

    fn report(percent: Option<f64>, total: Option<u64>) -> ProgressReport {
        ProgressReport {
            percent,
            transferred: 512,
            total,
            transferred_text: "512.00 B".to_string(),
            total_text: total.map_or_else(|| "unknown".to_string(), |_| "1.00 KB".to_string()),
            throughput_text: "256.00 B/s".to_string(),
        }
    }

    #[test]
    fn test_render_line_with_known_total() {
        let line = render_line("file.iso", &report(Some(50.0), Some(1024)));
        assert_eq!(line, "file.iso: 50.0% 512.00 B / 1.00 KB (256.00 B/s)");
    }

    #[test]
    fn test_render_line_with_unknown_total() {
        let line = render_line("file.iso", &report(None, None));
        assert_eq!(line, "file.iso: 512.00 B (256.00 B/s)");
    }

    #[test]
    fn test_disabled_progress_accepts_all_calls() {
        let progress = TransferProgress::new(false, "file.iso");
        assert!(!progress.is_enabled());
        progress.update(&report(Some(50.0), Some(1024)));
        progress.note("paused");
        progress.finish(&TerminalEvent {
            outcome: Outcome::Completed,
            message: "done".to_string(),
        });
    }

    #[test]
    fn test_enabled_progress_switches_to_bar_when_total_known() {
        let progress = TransferProgress::new(true, "file.iso");
        progress.update(&report(None, None));
        progress.update(&report(Some(50.0), Some(1024)));
        let bar = progress.bar.as_ref().map(ProgressBar::length);
        assert_eq!(bar, Some(Some(1024)));
        progress.finish(&TerminalEvent {
            outcome: Outcome::Cancelled,
            message: "stopped".to_string(),
        });
    }
}
