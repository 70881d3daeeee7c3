//! Run state model.
//!
//! [`RunState`] is the single record threaded through one workflow
//! execution. The engine owns all mutation; steps only produce
//! [`StepOutcome`](crate::step::StepOutcome)s that are merged in via
//! [`RunState::merge_batch`]. Merge semantics are explicit and tested
//! here rather than left to implicit runtime behavior.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::step::{StepOutcome, StepStatus};

/// Reserved step name under which the aggregator's outcome is recorded.
pub const AGGREGATE_STEP: &str = "aggregate";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque run identifier, assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque step name (e.g. `"technical"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Create a new step name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved aggregator name.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.0 == AGGREGATE_STEP
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a run.
///
/// Transitions are monotonic: `pending -> running -> {completed|failed}`.
/// There is no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage and polling consumers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status ends the run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Violations of the run-state merge contract.
///
/// These indicate engine bugs (double dispatch, routing to an
/// unrequested step), not recoverable step failures.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Two outcomes in one batch claimed the same step name.
    #[error("duplicate step '{0}' in merge batch")]
    DuplicateKey(StepName),

    /// Outcome for a step outside `steps_requested` plus the aggregate.
    #[error("outcome for unrequested step '{0}'")]
    UnknownStep(StepName),

    /// The aggregate result may only be set once.
    #[error("aggregate result already set")]
    AggregateAlreadySet,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// The versioned record that flows through one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Unique identifier, immutable after creation.
    pub run_id: RunId,
    /// Business input (ticker symbol), immutable after creation.
    pub subject: String,
    /// Steps configured for this run, in priority order, fixed at creation.
    pub steps_requested: Vec<StepName>,
    /// Per-step outcomes, keyed by name. Overwrite-by-key only.
    #[serde(default)]
    pub step_results: BTreeMap<StepName, StepOutcome>,
    /// Synthesized result, set exactly once by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_result: Option<serde_json::Value>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Most recently dispatched step. Observability only; control
    /// decisions derive from `step_results` and `steps_requested`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepName>,
    /// Attempts made per step.
    #[serde(default)]
    pub retry_counts: BTreeMap<StepName, u32>,
    /// Incremented on every persisted snapshot; strictly increasing.
    #[serde(default)]
    pub checkpoint_seq: u64,
    /// Run-level failure message, set only on `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// ISO-8601 UTC creation time.
    pub started_at: String,
    /// ISO-8601 UTC terminal time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl RunState {
    /// Create a fresh `pending` run.
    #[must_use]
    pub fn new(run_id: RunId, subject: impl Into<String>, steps_requested: Vec<StepName>) -> Self {
        Self {
            run_id,
            subject: subject.into(),
            steps_requested,
            step_results: BTreeMap::new(),
            aggregate_result: None,
            status: RunStatus::Pending,
            current_step: None,
            retry_counts: BTreeMap::new(),
            checkpoint_seq: 0,
            error_message: None,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    /// Whether the run has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attempts recorded for `name` so far.
    #[must_use]
    pub fn attempts(&self, name: &StepName) -> u32 {
        self.retry_counts.get(name).copied().unwrap_or(0)
    }

    /// Record one more attempt for `name`.
    pub fn record_attempt(&mut self, name: &StepName) {
        *self.retry_counts.entry(name.clone()).or_insert(0) += 1;
    }

    /// Steps whose recorded outcome is a success.
    #[must_use]
    pub fn succeeded_steps(&self) -> Vec<StepName> {
        self.steps_requested
            .iter()
            .filter(|name| {
                self.step_results
                    .get(name)
                    .is_some_and(|o| o.status == StepStatus::Success)
            })
            .cloned()
            .collect()
    }

    /// Steps whose recorded outcome is a failure.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<StepName> {
        self.steps_requested
            .iter()
            .filter(|name| {
                self.step_results
                    .get(name)
                    .is_some_and(|o| o.status == StepStatus::Failed)
            })
            .cloned()
            .collect()
    }

    /// Merge a batch of concurrently produced outcomes as one state
    /// transition.
    ///
    /// Union by key, last-write-wins per step name against previously
    /// stored outcomes.
    ///
    /// # Errors
    ///
    /// [`MergeError::DuplicateKey`] if two outcomes in this batch claim
    /// the same name; [`MergeError::UnknownStep`] if a name is outside
    /// `steps_requested` plus the reserved aggregate key. The state is
    /// not modified on error (all-or-nothing visibility).
    pub fn merge_batch(&mut self, batch: Vec<(StepName, StepOutcome)>) -> Result<(), MergeError> {
        let mut seen: Vec<&StepName> = Vec::with_capacity(batch.len());
        for (name, _) in &batch {
            if seen.contains(&name) {
                return Err(MergeError::DuplicateKey(name.clone()));
            }
            if !name.is_aggregate() && !self.steps_requested.contains(name) {
                return Err(MergeError::UnknownStep(name.clone()));
            }
            seen.push(name);
        }
        for (name, outcome) in batch {
            self.step_results.insert(name, outcome);
        }
        Ok(())
    }

    /// Set the aggregate result, exactly once.
    ///
    /// # Errors
    ///
    /// [`MergeError::AggregateAlreadySet`] if already set.
    pub fn set_aggregate(&mut self, value: serde_json::Value) -> Result<(), MergeError> {
        if self.aggregate_result.is_some() {
            return Err(MergeError::AggregateAlreadySet);
        }
        self.aggregate_result = Some(value);
        Ok(())
    }

    /// Transition `pending -> running`. No-op in any other status.
    pub fn mark_running(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Running;
        }
    }

    /// Transition to `completed`. No-op once terminal.
    pub fn complete(&mut self) {
        if !self.is_terminal() {
            self.status = RunStatus::Completed;
            self.finished_at = Some(Utc::now().to_rfc3339());
        }
    }

    /// Transition to `failed` with a run-level error message. No-op once
    /// terminal.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.is_terminal() {
            self.status = RunStatus::Failed;
            self.error_message = Some(message.into());
            self.finished_at = Some(Utc::now().to_rfc3339());
        }
    }

    /// Condensed view for listings.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            subject: self.subject.clone(),
            status: self.status,
            checkpoint_seq: self.checkpoint_seq,
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Condensed run view returned by list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub subject: String,
    pub status: RunStatus,
    pub checkpoint_seq: u64,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(steps: &[&str]) -> RunState {
        RunState::new(
            RunId::new("run-1"),
            "AAPL",
            steps.iter().copied().map(StepName::new).collect(),
        )
    }

    fn success(payload: serde_json::Value) -> StepOutcome {
        StepOutcome::success(Some(payload), Utc::now().to_rfc3339())
    }

    fn failure(msg: &str) -> StepOutcome {
        StepOutcome::failure(msg, Utc::now().to_rfc3339())
    }

    #[test]
    fn run_id_display_and_as_str() {
        let id = RunId::new("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn step_name_aggregate_detection() {
        assert!(StepName::new("aggregate").is_aggregate());
        assert!(!StepName::new("technical").is_aggregate());
    }

    #[test]
    fn run_status_as_str_and_terminal() {
        assert_eq!(RunStatus::Pending.as_str(), "pending");
        assert_eq!(RunStatus::Running.as_str(), "running");
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn new_run_is_pending_with_zero_seq() {
        let s = state(&["technical", "news"]);
        assert_eq!(s.status, RunStatus::Pending);
        assert_eq!(s.checkpoint_seq, 0);
        assert!(s.step_results.is_empty());
        assert!(s.aggregate_result.is_none());
    }

    #[test]
    fn status_transitions_are_monotonic() {
        let mut s = state(&["technical"]);
        s.mark_running();
        assert_eq!(s.status, RunStatus::Running);

        s.complete();
        assert_eq!(s.status, RunStatus::Completed);
        assert!(s.finished_at.is_some());

        // No transition out of a terminal state.
        s.fail("too late");
        assert_eq!(s.status, RunStatus::Completed);
        assert!(s.error_message.is_none());
        s.mark_running();
        assert_eq!(s.status, RunStatus::Completed);
    }

    #[test]
    fn fail_records_message() {
        let mut s = state(&["technical"]);
        s.mark_running();
        s.fail("all requested steps failed");
        assert_eq!(s.status, RunStatus::Failed);
        assert_eq!(s.error_message.as_deref(), Some("all requested steps failed"));
    }

    #[test]
    fn merge_batch_unions_by_key() {
        let mut s = state(&["technical", "news"]);
        s.merge_batch(vec![
            (StepName::new("technical"), success(serde_json::json!({"rsi": 65.5}))),
            (StepName::new("news"), failure("feed unavailable")),
        ])
        .unwrap();
        assert_eq!(s.step_results.len(), 2);
        assert_eq!(s.succeeded_steps(), vec![StepName::new("technical")]);
        assert_eq!(s.failed_steps(), vec![StepName::new("news")]);
    }

    #[test]
    fn merge_batch_last_write_wins_across_batches() {
        let mut s = state(&["news"]);
        s.merge_batch(vec![(StepName::new("news"), failure("timeout"))])
            .unwrap();
        s.merge_batch(vec![(StepName::new("news"), success(serde_json::json!({"n": 3})))])
            .unwrap();
        let outcome = &s.step_results[&StepName::new("news")];
        assert_eq!(outcome.status, StepStatus::Success);
    }

    #[test]
    fn merge_batch_rejects_duplicate_key_in_batch() {
        let mut s = state(&["news"]);
        let err = s
            .merge_batch(vec![
                (StepName::new("news"), failure("a")),
                (StepName::new("news"), failure("b")),
            ])
            .unwrap_err();
        assert!(matches!(err, MergeError::DuplicateKey(_)));
        // All-or-nothing: nothing was merged.
        assert!(s.step_results.is_empty());
    }

    #[test]
    fn merge_batch_rejects_unrequested_step() {
        let mut s = state(&["news"]);
        let err = s
            .merge_batch(vec![(StepName::new("bogus"), failure("x"))])
            .unwrap_err();
        assert!(matches!(err, MergeError::UnknownStep(_)));
    }

    #[test]
    fn merge_batch_accepts_reserved_aggregate_key() {
        let mut s = state(&["news"]);
        s.merge_batch(vec![(
            StepName::new(AGGREGATE_STEP),
            success(serde_json::json!({"overall_score": 7.5})),
        )])
        .unwrap();
        assert!(s.step_results.contains_key(&StepName::new(AGGREGATE_STEP)));
    }

    #[test]
    fn aggregate_result_set_once() {
        let mut s = state(&["news"]);
        s.set_aggregate(serde_json::json!({"score": 1})).unwrap();
        let err = s.set_aggregate(serde_json::json!({"score": 2})).unwrap_err();
        assert!(matches!(err, MergeError::AggregateAlreadySet));
        assert_eq!(s.aggregate_result, Some(serde_json::json!({"score": 1})));
    }

    #[test]
    fn record_attempt_accumulates() {
        let mut s = state(&["news"]);
        let name = StepName::new("news");
        assert_eq!(s.attempts(&name), 0);
        s.record_attempt(&name);
        s.record_attempt(&name);
        assert_eq!(s.attempts(&name), 2);
    }

    #[test]
    fn run_state_serde_roundtrip() {
        let mut s = state(&["technical", "news"]);
        s.mark_running();
        s.merge_batch(vec![(
            StepName::new("technical"),
            success(serde_json::json!({"score": 7.5})),
        )])
        .unwrap();
        s.record_attempt(&StepName::new("technical"));
        s.checkpoint_seq = 3;

        let json = serde_json::to_string(&s).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn summary_reflects_state() {
        let mut s = state(&["news"]);
        s.mark_running();
        s.fail("boom");
        let summary = s.summary();
        assert_eq!(summary.run_id, s.run_id);
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.error_message.as_deref(), Some("boom"));
    }
}
