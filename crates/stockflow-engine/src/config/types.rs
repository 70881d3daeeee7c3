//! Workflow configuration schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stockflow_types::StepName;

use crate::orchestrator::EngineOptions;
use crate::router::{CompletionPolicy, RoutingPolicy};

/// Parsed workflow YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub version: String,
    /// Workflow name, for logs and listings.
    pub workflow: String,
    /// Steps to run, in priority order.
    pub steps: Vec<String>,
    /// Step that must terminally succeed before the rest dispatch.
    #[serde(default)]
    pub gating_step: Option<String>,
    #[serde(default)]
    pub policy: CompletionPolicy,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl WorkflowConfig {
    /// Engine options derived from this configuration.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            routing: RoutingPolicy {
                gating_step: self.gating_step.as_deref().map(StepName::new),
                max_retries: self.resources.max_retries,
                completion: self.policy,
            },
            step_timeout: Duration::from_secs(self.resources.step_timeout_seconds),
            checkpoint_write_retries: self.resources.checkpoint_write_retries,
        }
    }

    /// Requested steps as typed names.
    #[must_use]
    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| StepName::new(s.as_str())).collect()
    }
}

/// Retry and deadline budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_step_timeout_seconds")]
    pub step_timeout_seconds: u64,
    #[serde(default = "default_checkpoint_write_retries")]
    pub checkpoint_write_retries: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_step_timeout_seconds() -> u64 {
    30
}

fn default_checkpoint_write_retries() -> u32 {
    3
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            step_timeout_seconds: default_step_timeout_seconds(),
            checkpoint_write_retries: default_checkpoint_write_retries(),
        }
    }
}

/// Checkpoint store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackendKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_backend")]
    pub backend: StateBackendKind,
    /// Database path for the sqlite backend. Defaults to
    /// `./stockflow_state.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_backend() -> StateBackendKind {
    StateBackendKind::Sqlite
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_defaults() {
        let r = ResourceConfig::default();
        assert_eq!(r.max_retries, 2);
        assert_eq!(r.step_timeout_seconds, 30);
        assert_eq!(r.checkpoint_write_retries, 3);
    }

    #[test]
    fn engine_options_carry_gating_and_policy() {
        let config = WorkflowConfig {
            version: "1.0".into(),
            workflow: "analyze_stock".into(),
            steps: vec!["technical".into(), "news".into()],
            gating_step: Some("technical".into()),
            policy: CompletionPolicy::AllMustSucceed,
            resources: ResourceConfig {
                max_retries: 1,
                step_timeout_seconds: 5,
                checkpoint_write_retries: 2,
            },
            state: StateConfig::default(),
        };

        let opts = config.engine_options();
        assert_eq!(opts.routing.gating_step, Some(StepName::new("technical")));
        assert_eq!(opts.routing.max_retries, 1);
        assert_eq!(opts.routing.completion, CompletionPolicy::AllMustSucceed);
        assert_eq!(opts.step_timeout, Duration::from_secs(5));
    }
}
