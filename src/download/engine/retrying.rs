//! Retry-with-backoff wrapper around a single transfer attempt.

use std::future::Future;

use tracing::{debug, instrument, warn};

use super::Finish;
use crate::download::retry::{RetryDecision, RetryPolicy};
use crate::download::session::TransferSession;
use crate::download::DownloadError;

/// Runs `attempt_fn` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent.
///
/// Each attempt re-reads the destination size itself, so bytes written by a
/// failed attempt are kept. A cancel that lands during a backoff sleep ends
/// the run as [`Finish::Cancelled`].
///
/// # Errors
///
/// Returns the last attempt's error when no further attempt is made.
#[instrument(skip_all, fields(url = %session.source_url()))]
pub(super) async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    session: &TransferSession,
    mut attempt_fn: F,
) -> Result<Finish, DownloadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Finish, DownloadError>>,
{
    let mut attempt = 1u32;

    loop {
        debug!(attempt, "starting transfer attempt");

        let error = match attempt_fn(attempt).await {
            Ok(finish) => return Ok(finish),
            Err(error) => error,
        };

        match policy.decide(&error, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    attempt,
                    next_attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "transfer attempt failed, retrying"
                );
                if !session.sleep_unless_cancelled(delay).await {
                    debug!("cancelled during backoff");
                    return Ok(Finish::Cancelled);
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(attempt, reason = %reason, error = %error, "giving up on transfer");
                return Err(error);
            }
        }
    }
}
