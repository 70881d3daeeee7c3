//! Workflow YAML loading.
//!
//! `${VAR}` placeholders are expanded from the process environment
//! before deserialization, so machine-specific values like database
//! paths stay out of the workflow file.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};

use crate::config::types::WorkflowConfig;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

/// Expand every `${VAR}` in `raw` from the environment. Unset variables
/// are collected and reported together rather than one at a time.
fn expand_env(raw: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let expanded = PLACEHOLDER.replace_all(raw, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.insert(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        bail!("Missing environment variable(s): {}", names.join(", "));
    }
    Ok(expanded.into_owned())
}

/// Parse workflow YAML from a string.
///
/// # Errors
///
/// Returns an error if a `${VAR}` placeholder references an unset
/// environment variable or the YAML does not match the schema.
pub fn parse_workflow_str(yaml_str: &str) -> Result<WorkflowConfig> {
    let expanded = expand_env(yaml_str)?;
    serde_yaml::from_str(&expanded).context("Failed to parse workflow YAML")
}

/// Parse a workflow YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a placeholder is
/// unset, or the YAML is invalid.
pub fn parse_workflow(path: &Path) -> Result<WorkflowConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
    parse_workflow_str(&content)
        .with_context(|| format!("Invalid workflow file: {}", path.display()))
}
