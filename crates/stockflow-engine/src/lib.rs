//! Core orchestration crate for Stockflow workflow execution.
//!
//! The engine drives one run at a time: consult the [`router`], dispatch
//! eligible steps concurrently, merge their outcomes into the run state
//! as a single transition, checkpoint, repeat until terminal. Runs for
//! different run identifiers are fully independent.

#![warn(clippy::pedantic)]

pub mod collectors;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod resolve;
pub mod router;
pub mod step;

// Re-export public API for convenience
pub use error::OrchestratorError;
pub use orchestrator::{EngineOptions, Orchestrator};
pub use registry::StepRegistry;
pub use router::{next_action, CompletionPolicy, NextAction, RoutingPolicy};
pub use step::Step;
