//! Shared model types for the Stockflow orchestrator.
//!
//! Pure data types threaded through the engine and checkpoint crates.
//! Kept in a leaf crate so both can share them without circular
//! dependencies.

#![warn(clippy::pedantic)]

pub mod run;
pub mod step;

pub use run::{MergeError, RunId, RunState, RunStatus, RunSummary, StepName, AGGREGATE_STEP};
pub use step::{StepContext, StepOutcome, StepStatus};
