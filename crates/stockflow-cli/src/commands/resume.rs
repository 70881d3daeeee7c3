use std::path::Path;

use anyhow::Result;
use stockflow_types::RunId;

use crate::commands::{build_orchestrator, exit_code_for, print_state, print_state_json};

/// Execute the `resume` command: reload a run from its latest
/// checkpoint and drive it forward. Resuming an already-terminal run
/// just reports its stored state.
pub async fn execute(workflow_path: &Path, run_id: &str) -> Result<()> {
    let (_config, _store, orchestrator) = build_orchestrator(workflow_path)?;

    let state = orchestrator.resume(&RunId::new(run_id)).await?;
    print_state(&state);
    print_state_json(&state);
    exit_code_for(&state)
}
