//! Semantic validation for parsed workflow configuration values.

use anyhow::{bail, Result};
use stockflow_types::AGGREGATE_STEP;

use crate::config::types::WorkflowConfig;

/// Validate a parsed workflow configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the
/// workflow config.
pub fn validate_workflow(config: &WorkflowConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported workflow version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.workflow.trim().is_empty() {
        errors.push("Workflow name must not be empty".to_string());
    }

    if config.steps.is_empty() {
        errors.push("At least one step must be configured".to_string());
    }

    for (i, step) in config.steps.iter().enumerate() {
        if step.trim().is_empty() {
            errors.push(format!("Step {i} has an empty name"));
        }
        if step == AGGREGATE_STEP {
            errors.push(format!("Step name '{AGGREGATE_STEP}' is reserved"));
        }
        if config.steps[..i].contains(step) {
            errors.push(format!("Duplicate step name '{step}'"));
        }
    }

    if let Some(ref gate) = config.gating_step {
        if !config.steps.contains(gate) {
            errors.push(format!(
                "Gating step '{gate}' is not in the configured step list"
            ));
        }
    }

    if config.resources.step_timeout_seconds == 0 {
        errors.push("step_timeout_seconds must be > 0".to_string());
    }

    if !errors.is_empty() {
        bail!("Invalid workflow configuration:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}
