//! Step outcome and context types.
//!
//! A step is an opaque unit of work with a declared name and a
//! success/failure outcome. The engine builds [`StepOutcome`]s from
//! whatever a step implementation returns; steps never touch run state
//! directly.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::run::{RunId, StepName};

/// Terminal status of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

impl StepStatus {
    /// Wire-format string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of one step execution.
///
/// `payload` is opaque structured data; the core imposes no contract on
/// its shape beyond success/failure plus an optional error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO-8601 UTC dispatch time.
    pub started_at: String,
    /// ISO-8601 UTC completion time.
    pub completed_at: String,
}

impl StepOutcome {
    /// Successful outcome completed now.
    #[must_use]
    pub fn success(payload: Option<serde_json::Value>, started_at: String) -> Self {
        Self {
            status: StepStatus::Success,
            payload,
            error: None,
            started_at,
            completed_at: Utc::now().to_rfc3339(),
        }
    }

    /// Failed outcome completed now.
    #[must_use]
    pub fn failure(error: impl Into<String>, started_at: String) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: None,
            error: Some(error.into()),
            started_at,
            completed_at: Utc::now().to_rfc3339(),
        }
    }

    /// Whether this outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Read-only context handed to a step on dispatch.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: RunId,
    /// Business input (ticker symbol).
    pub subject: String,
    /// Outcomes already recorded for this run. The aggregator receives
    /// the full mapping; regular steps see whatever completed before
    /// their batch.
    pub prior_results: BTreeMap<StepName, StepOutcome>,
}
