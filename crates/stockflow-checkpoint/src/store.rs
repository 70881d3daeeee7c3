//! Checkpoint store trait definition.
//!
//! [`CheckpointStore`] defines the storage contract for durable run-state
//! snapshots keyed by run identifier plus sequence number. Model types
//! live in [`stockflow_types::run`].

use stockflow_types::{RunId, RunState, RunSummary};

use crate::error;

/// Storage contract for run-state checkpoints.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn CheckpointStore>`, and must serialize saves for the same
/// `run_id` so `checkpoint_seq` stays strictly increasing — a save whose
/// sequence is at or below the stored maximum is rejected with
/// [`CheckpointError::StaleSequence`](crate::CheckpointError::StaleSequence).
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot under `(state.run_id, state.checkpoint_seq)`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`](crate::CheckpointError) on storage
    /// failure or a stale sequence number.
    fn save(&self, state: &RunState) -> error::Result<()>;

    /// Load the snapshot with the highest `checkpoint_seq` for `run_id`.
    ///
    /// Returns `Ok(None)` when the run has never been checkpointed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`](crate::CheckpointError) on storage
    /// failure.
    fn load_latest(&self, run_id: &RunId) -> error::Result<Option<RunState>>;

    /// Snapshot history for `run_id`, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`](crate::CheckpointError) on storage
    /// failure.
    fn list(&self, run_id: &RunId, limit: usize) -> error::Result<Vec<RunState>>;

    /// Latest snapshot summaries across all runs, most recently started
    /// first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`](crate::CheckpointError) on storage
    /// failure.
    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunSummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn CheckpointStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn CheckpointStore) {}
    }
}
