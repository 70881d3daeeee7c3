//! Orchestrator error model and checkpoint-write backoff policy.

use std::time::Duration;

use stockflow_checkpoint::CheckpointError;
use stockflow_types::{MergeError, RunId, RunStatus};

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 10_000;

/// Errors surfaced to callers of the orchestrator boundary operations.
///
/// Step-level failures never appear here: they are contained in
/// `step_results` and only surface as run-level `failed` status. These
/// variants cover malformed submissions, unknown runs, and
/// infrastructure faults.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Malformed submission (unknown step name, empty subject). Rejected
    /// before any run state is created; never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// No checkpoint exists for the requested run.
    #[error("run not found: {0}")]
    NotFound(RunId),

    /// The drive loop was entered for a run that already finished.
    #[error("run {run_id} is already {status}")]
    AlreadyTerminal { run_id: RunId, status: RunStatus },

    /// Checkpoint persistence failed after exhausting write retries.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Run-state merge contract violation (engine bug).
    #[error("state merge error: {0}")]
    Merge(#[from] MergeError),

    /// Opaque host-side failure (task panic, join error, etc.).
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

/// Exponential backoff for checkpoint write retries.
pub(crate) fn compute_backoff(attempt: u32) -> Duration {
    let delay_ms = BACKOFF_BASE_MS.saturating_mul(2u64.pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(compute_backoff(1), Duration::from_millis(500));
        assert_eq!(compute_backoff(2), Duration::from_millis(1_000));
        assert_eq!(compute_backoff(3), Duration::from_millis(2_000));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(compute_backoff(10), Duration::from_millis(10_000));
        assert_eq!(compute_backoff(32), Duration::from_millis(10_000));
    }

    #[test]
    fn validation_error_displays_message() {
        let err = OrchestratorError::Validation("unknown step name 'bogus'".into());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn already_terminal_displays_status() {
        let err = OrchestratorError::AlreadyTerminal {
            run_id: RunId::new("r1"),
            status: RunStatus::Completed,
        };
        assert!(err.to_string().contains("completed"));
    }
}
