//! Exit code logic for the dlkit process.
//!
//! Single responsibility: map a transfer outcome to the process exit outcome.

use dlkit::Outcome;

use crate::ProcessExit;

/// Determines the process exit outcome from a transfer's final outcome.
pub(crate) fn determine_exit_outcome(outcome: Outcome) -> ProcessExit {
    match outcome {
        Outcome::Completed => ProcessExit::Success,
        Outcome::Failed => ProcessExit::Failure,
        Outcome::Cancelled => ProcessExit::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::determine_exit_outcome;
    use crate::ProcessExit;
    use dlkit::Outcome;

    #[test]
    fn test_exit_outcome_success_when_completed() {
        assert_eq!(determine_exit_outcome(Outcome::Completed), ProcessExit::Success);
        assert_eq!(ProcessExit::Success.code(), 0);
    }

    #[test]
    fn test_exit_outcome_failure_when_failed() {
        assert_eq!(determine_exit_outcome(Outcome::Failed), ProcessExit::Failure);
        assert_eq!(ProcessExit::Failure.code(), 1);
    }

    #[test]
    fn test_exit_outcome_cancelled_uses_sigint_code() {
        assert_eq!(determine_exit_outcome(Outcome::Cancelled), ProcessExit::Cancelled);
        assert_eq!(ProcessExit::Cancelled.code(), 130);
    }
}
