//! Run-state checkpoint persistence for the Stockflow engine.
//!
//! Provides the [`CheckpointStore`] trait, a [`SqliteCheckpointStore`]
//! for durable file-backed storage, and a [`MemoryCheckpointStore`]
//! reference implementation.

#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{CheckpointError, Result};
pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;
pub use store::CheckpointStore;
