//! Collaborator wiring: checkpoint store creation and the built-in
//! step registry.
//!
//! The engine and its steps receive all collaborators by injection;
//! these helpers are the composition points callers (the CLI, tests)
//! use to build them from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use stockflow_checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};

use crate::collectors::{FundamentalsCollector, NewsCollector, TechnicalCollector};
use crate::config::types::{StateBackendKind, StateConfig};
use crate::error::OrchestratorError;
use crate::registry::StepRegistry;

const DEFAULT_SQLITE_PATH: &str = "stockflow_state.db";

/// Create the checkpoint store selected by `config`.
///
/// # Errors
///
/// Returns [`OrchestratorError::Checkpoint`] if the sqlite database
/// cannot be opened.
pub fn create_checkpoint_store(
    config: &StateConfig,
) -> Result<Arc<dyn CheckpointStore>, OrchestratorError> {
    match config.backend {
        StateBackendKind::Sqlite => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));
            let store = SqliteCheckpointStore::open(&path)?;
            tracing::debug!(path = %path.display(), "Opened sqlite checkpoint store");
            Ok(Arc::new(store))
        }
        StateBackendKind::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
    }
}

/// Registry pre-populated with the built-in collectors.
#[must_use]
pub fn builtin_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry.register(Arc::new(TechnicalCollector));
    registry.register(Arc::new(FundamentalsCollector));
    registry.register(Arc::new(NewsCollector));
    registry
}
