pub mod list;
pub mod resume;
pub mod run;
pub mod show;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use stockflow_checkpoint::CheckpointStore;
use stockflow_engine::collectors::ScoreAggregator;
use stockflow_engine::config::parser;
use stockflow_engine::config::types::WorkflowConfig;
use stockflow_engine::config::validator;
use stockflow_engine::{resolve, Orchestrator};
use stockflow_types::{RunState, RunStatus};

/// Parse and validate a workflow file, then wire up an orchestrator
/// with the built-in collectors and the configured checkpoint store.
pub(crate) fn build_orchestrator(
    workflow_path: &Path,
) -> Result<(WorkflowConfig, Arc<dyn CheckpointStore>, Arc<Orchestrator>)> {
    let config = parser::parse_workflow(workflow_path)
        .with_context(|| format!("Failed to parse workflow: {}", workflow_path.display()))?;
    validator::validate_workflow(&config)?;

    let store = resolve::create_checkpoint_store(&config.state)?;
    let orchestrator = Orchestrator::new(
        Arc::new(resolve::builtin_registry()),
        Arc::new(ScoreAggregator),
        Arc::clone(&store),
        config.engine_options(),
    );

    Ok((config, store, Arc::new(orchestrator)))
}

/// Human-readable report for a finished or in-flight run.
pub(crate) fn print_state(state: &RunState) {
    println!("Run {}", state.run_id);
    println!("  Subject:   {}", state.subject);
    println!("  Status:    {}", state.status);
    println!("  Started:   {}", state.started_at);
    if let Some(ref finished) = state.finished_at {
        println!("  Finished:  {finished}");
    }
    if let Some(ref message) = state.error_message {
        println!("  Error:     {message}");
    }
    println!("  Steps:");
    for name in &state.steps_requested {
        let label = name.as_str();
        match state.step_results.get(name) {
            Some(outcome) if outcome.is_success() => {
                println!("    {label:16} ok ({} attempt(s))", state.attempts(name));
            }
            Some(outcome) => {
                let reason = outcome.error.as_deref().unwrap_or("unknown error");
                println!(
                    "    {label:16} failed ({} attempt(s)): {reason}",
                    state.attempts(name)
                );
            }
            None => println!("    {label:16} pending"),
        }
    }
    if let Some(ref aggregate) = state.aggregate_result {
        println!("  Aggregate:");
        for key in ["overall_score", "recommendation", "confidence"] {
            if let Some(value) = aggregate.get(key) {
                println!("    {key:16} {value}");
            }
        }
    }
}

/// Machine-readable JSON line for scripting on top of the CLI.
pub(crate) fn print_state_json(state: &RunState) {
    let json = serde_json::json!({
        "run_id": state.run_id,
        "subject": state.subject,
        "status": state.status.as_str(),
        "checkpoint_seq": state.checkpoint_seq,
        "succeeded": state.succeeded_steps(),
        "failed": state.failed_steps(),
        "aggregate": state.aggregate_result,
        "error": state.error_message,
    });
    println!("@@RUN_JSON@@{json}");
}

pub(crate) fn exit_code_for(state: &RunState) -> Result<()> {
    if state.status == RunStatus::Failed {
        anyhow::bail!(
            "run {} failed: {}",
            state.run_id,
            state.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
