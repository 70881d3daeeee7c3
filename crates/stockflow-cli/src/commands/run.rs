use std::path::Path;

use anyhow::Result;

use crate::commands::{build_orchestrator, exit_code_for, print_state, print_state_json};

/// Execute the `run` command: parse and validate the workflow, then
/// start a run for `subject`.
pub async fn execute(workflow_path: &Path, subject: &str, detach: bool) -> Result<()> {
    let (config, _store, orchestrator) = build_orchestrator(workflow_path)?;
    let steps = config.step_names();

    tracing::info!(
        workflow = config.workflow,
        subject,
        steps = steps.len(),
        "Workflow validated"
    );

    if detach {
        let run_id = orchestrator.start_detached(subject, &steps).await?;
        println!("Run {run_id} submitted.");
        println!("Track it with: stockflow show {} {run_id}", workflow_path.display());
        return Ok(());
    }

    let state = orchestrator.start(subject, &steps).await?;
    print_state(&state);
    print_state_json(&state);
    exit_code_for(&state)
}
