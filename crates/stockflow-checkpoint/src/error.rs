//! Checkpoint store error types.

use stockflow_types::RunId;

/// Errors produced by [`CheckpointStore`](crate::CheckpointStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("checkpoint store lock poisoned")]
    LockPoisoned,

    /// A save carried a sequence number at or below the stored maximum.
    /// Indicates a stale writer; the snapshot was not persisted.
    #[error("stale checkpoint for run {run_id}: seq {seq} is not above latest {latest}")]
    StaleSequence { run_id: RunId, seq: u64, latest: u64 },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CheckpointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_sequence_displays_context() {
        let err = CheckpointError::StaleSequence {
            run_id: RunId::new("run-9"),
            seq: 3,
            latest: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("run-9"), "got: {msg}");
        assert!(msg.contains('3') && msg.contains('5'), "got: {msg}");
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(
            CheckpointError::LockPoisoned.to_string(),
            "checkpoint store lock poisoned"
        );
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(CheckpointError::Io(inner).to_string().contains("i/o"));
    }
}
