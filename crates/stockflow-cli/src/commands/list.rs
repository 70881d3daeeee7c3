use std::path::Path;

use anyhow::Result;

use crate::commands::build_orchestrator;

/// Execute the `list` command: print recent runs, most recently
/// started first.
pub async fn execute(workflow_path: &Path, limit: usize) -> Result<()> {
    let (_config, _store, orchestrator) = build_orchestrator(workflow_path)?;

    let runs = orchestrator.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    println!(
        "{:38} {:8} {:10} {:26} {}",
        "RUN", "SUBJECT", "STATUS", "STARTED", "DETAIL"
    );
    for run in &runs {
        let detail = run.error_message.as_deref().unwrap_or("");
        println!(
            "{:38} {:8} {:10} {:26} {}",
            run.run_id.as_str(),
            run.subject,
            run.status.as_str(),
            run.started_at,
            detail
        );
    }
    Ok(())
}
