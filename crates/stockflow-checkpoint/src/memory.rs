//! In-memory reference implementation of [`CheckpointStore`].
//!
//! Keeps full snapshot history per run behind a single mutex. Intended
//! for tests and embedded use; durability comes from
//! [`SqliteCheckpointStore`](crate::SqliteCheckpointStore).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use stockflow_types::{RunId, RunState, RunSummary};

use crate::error::{self, CheckpointError};
use crate::store::CheckpointStore;

type History = BTreeMap<u64, RunState>;

/// In-memory checkpoint storage.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    runs: Mutex<HashMap<RunId, History>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_runs(&self) -> error::Result<MutexGuard<'_, HashMap<RunId, History>>> {
        self.runs.lock().map_err(|_| CheckpointError::LockPoisoned)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, state: &RunState) -> error::Result<()> {
        let mut runs = self.lock_runs()?;
        let history = runs.entry(state.run_id.clone()).or_default();

        if let Some((&latest, _)) = history.last_key_value() {
            if state.checkpoint_seq <= latest {
                return Err(CheckpointError::StaleSequence {
                    run_id: state.run_id.clone(),
                    seq: state.checkpoint_seq,
                    latest,
                });
            }
        }
        history.insert(state.checkpoint_seq, state.clone());
        Ok(())
    }

    fn load_latest(&self, run_id: &RunId) -> error::Result<Option<RunState>> {
        let runs = self.lock_runs()?;
        Ok(runs
            .get(run_id)
            .and_then(|history| history.last_key_value())
            .map(|(_, state)| state.clone()))
    }

    fn list(&self, run_id: &RunId, limit: usize) -> error::Result<Vec<RunState>> {
        let runs = self.lock_runs()?;
        Ok(runs
            .get(run_id)
            .map(|history| history.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn list_runs(&self, limit: usize) -> error::Result<Vec<RunSummary>> {
        let runs = self.lock_runs()?;
        let mut summaries: Vec<RunSummary> = runs
            .values()
            .filter_map(|history| history.last_key_value())
            .map(|(_, state)| state.summary())
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}
