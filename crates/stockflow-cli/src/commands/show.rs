use std::path::Path;

use anyhow::Result;
use stockflow_types::RunId;

use crate::commands::{build_orchestrator, print_state, print_state_json};

/// Execute the `show` command: print the latest checkpointed state of
/// a run, optionally with its recent checkpoint history.
pub async fn execute(workflow_path: &Path, run_id: &str, history: usize) -> Result<()> {
    let (_config, store, orchestrator) = build_orchestrator(workflow_path)?;

    let run_id = RunId::new(run_id);
    let state = orchestrator.get_state(&run_id).await?;
    print_state(&state);

    if history > 0 {
        println!("  History (newest first):");
        for snapshot in store.list(&run_id, history)? {
            println!(
                "    seq {:>4}  {:9}  {} step outcome(s)",
                snapshot.checkpoint_seq,
                snapshot.status.as_str(),
                snapshot.step_results.len()
            );
        }
    }

    print_state_json(&state);
    Ok(())
}
