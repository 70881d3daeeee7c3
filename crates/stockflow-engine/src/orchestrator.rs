//! Orchestrator engine: drives runs from submission to terminal state.
//!
//! One logical control task owns run-state mutation and checkpoint
//! writes for a given run; the only parallelism is the concurrent
//! dispatch of independently eligible steps within one batch. Outcomes
//! of a batch are merged as a single state transition before the next
//! checkpoint write, so persisted state never shows a partially merged
//! batch.
//!
//! The core does not provide run-level mutual exclusion against
//! duplicate concurrent drivers for the same run; callers must confirm
//! a prior loop has terminated before resuming. A stale duplicate
//! writer is caught by the store's sequence check and fails fast.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use stockflow_checkpoint::{CheckpointError, CheckpointStore};
use stockflow_types::{
    RunId, RunState, RunStatus, RunSummary, StepContext, StepName, StepOutcome, AGGREGATE_STEP,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{compute_backoff, OrchestratorError};
use crate::registry::StepRegistry;
use crate::router::{next_action, NextAction, RoutingPolicy};
use crate::step::Step;

/// Engine tuning knobs, fixed per orchestrator instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub routing: RoutingPolicy,
    /// Deadline per step dispatch; overruns become failure outcomes
    /// charged against the step's retry budget.
    pub step_timeout: Duration,
    /// Additional attempts for a failed checkpoint write before the run
    /// is marked failed.
    pub checkpoint_write_retries: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            routing: RoutingPolicy::default(),
            step_timeout: Duration::from_secs(30),
            checkpoint_write_retries: 3,
        }
    }
}

/// Drives the submit/route/dispatch/merge/checkpoint loop.
///
/// All collaborators are injected; the engine holds no global state and
/// instances are cheap to share behind an `Arc` for detached runs.
pub struct Orchestrator {
    registry: Arc<StepRegistry>,
    aggregator: Arc<dyn Step>,
    store: Arc<dyn CheckpointStore>,
    options: EngineOptions,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<StepRegistry>,
        aggregator: Arc<dyn Step>,
        store: Arc<dyn CheckpointStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            registry,
            aggregator,
            store,
            options,
        }
    }

    /// Validate a submission and persist the initial `pending` snapshot.
    ///
    /// No run state is created for invalid submissions.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::Validation`] for an empty subject, an empty
    /// or duplicated step list, the reserved aggregate name, or a step
    /// name with no registered implementation;
    /// [`OrchestratorError::Checkpoint`] if the initial snapshot cannot
    /// be persisted.
    pub async fn submit(
        &self,
        subject: &str,
        steps: &[StepName],
    ) -> Result<RunState, OrchestratorError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(OrchestratorError::Validation(
                "subject must not be empty".into(),
            ));
        }
        if steps.is_empty() {
            return Err(OrchestratorError::Validation(
                "at least one step must be requested".into(),
            ));
        }
        for (i, name) in steps.iter().enumerate() {
            if name.is_aggregate() {
                return Err(OrchestratorError::Validation(format!(
                    "step name '{AGGREGATE_STEP}' is reserved"
                )));
            }
            if steps[..i].contains(name) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate step name '{name}'"
                )));
            }
            if !self.registry.contains(name) {
                return Err(OrchestratorError::Validation(format!(
                    "unknown step name '{name}'"
                )));
            }
        }

        let run_id = RunId::new(Uuid::new_v4().to_string());
        let mut state = RunState::new(run_id, subject, steps.to_vec());
        self.checkpoint(&mut state).await?;

        tracing::info!(
            run_id = %state.run_id,
            subject = state.subject,
            steps = steps.len(),
            "Run submitted"
        );
        Ok(state)
    }

    /// Submit and drive to completion (synchronous mode).
    ///
    /// # Errors
    ///
    /// Validation errors from [`submit`](Self::submit), or checkpoint /
    /// infrastructure errors from the drive loop. Step failures are not
    /// errors; they surface in the returned state.
    pub async fn start(
        &self,
        subject: &str,
        steps: &[StepName],
    ) -> Result<RunState, OrchestratorError> {
        let state = self.submit(subject, steps).await?;
        self.drive(state).await
    }

    /// Submit and drive on a spawned task (asynchronous mode), returning
    /// the run identifier immediately. Callers observe progress by
    /// polling [`get_state`](Self::get_state) until a terminal status.
    ///
    /// # Errors
    ///
    /// Validation and initial-checkpoint errors, reported before the
    /// task is spawned. Later engine errors are logged and recorded in
    /// the persisted run state.
    pub async fn start_detached(
        self: &Arc<Self>,
        subject: &str,
        steps: &[StepName],
    ) -> Result<RunId, OrchestratorError> {
        let state = self.submit(subject, steps).await?;
        let run_id = state.run_id.clone();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let run_id = state.run_id.clone();
            if let Err(error) = engine.drive(state).await {
                tracing::error!(run_id = %run_id, "Detached run aborted: {error}");
            }
        });
        Ok(run_id)
    }

    /// Re-enter the drive loop from the latest checkpoint.
    ///
    /// Idempotent on an already-terminal run: returns the stored state
    /// without re-invoking any step. Otherwise re-dispatches any step
    /// whose outcome is missing or failed with remaining retry budget.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] if no checkpoint exists for
    /// `run_id`; checkpoint / infrastructure errors from the loop.
    pub async fn resume(&self, run_id: &RunId) -> Result<RunState, OrchestratorError> {
        let state = self
            .load_latest(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(run_id.clone()))?;

        if state.is_terminal() {
            tracing::info!(
                run_id = %run_id,
                status = %state.status,
                "Resume on terminal run is a no-op"
            );
            return Ok(state);
        }

        tracing::info!(
            run_id = %run_id,
            seq = state.checkpoint_seq,
            status = %state.status,
            "Resuming run from latest checkpoint"
        );
        self.drive(state).await
    }

    /// Read-only snapshot of the latest checkpoint. No side effects.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] if the run is unknown.
    pub async fn get_state(&self, run_id: &RunId) -> Result<RunState, OrchestratorError> {
        self.load_latest(run_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(run_id.clone()))
    }

    /// Latest summaries across runs, most recently started first.
    ///
    /// # Errors
    ///
    /// Checkpoint store failures.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>, OrchestratorError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.list_runs(limit))
            .await
            .map_err(|e| OrchestratorError::Infrastructure(anyhow!("store task panicked: {e}")))?
            .map_err(OrchestratorError::Checkpoint)
    }

    /// Drive `state` until terminal, checkpointing after every merge.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::AlreadyTerminal`] when handed a finished
    /// run (duplicate-driver guard); checkpoint errors once write
    /// retries are exhausted.
    async fn drive(&self, mut state: RunState) -> Result<RunState, OrchestratorError> {
        if state.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal {
                run_id: state.run_id.clone(),
                status: state.status,
            });
        }

        if state.status == RunStatus::Pending {
            state.mark_running();
            self.checkpoint(&mut state).await?;
        }

        loop {
            match next_action(&state, &self.options.routing) {
                NextAction::Dispatch(names) => {
                    self.dispatch_batch(&mut state, names).await?;
                }
                NextAction::Aggregate => {
                    self.run_aggregate(&mut state).await?;
                    if state.is_terminal() {
                        return Ok(state);
                    }
                }
                NextAction::Fail => {
                    if !state.is_terminal() {
                        let message = synthesize_failure_message(&state);
                        tracing::warn!(run_id = %state.run_id, "Run failed: {message}");
                        state.fail(message);
                        state.current_step = None;
                        self.checkpoint(&mut state).await?;
                    }
                    return Ok(state);
                }
                NextAction::Done => {
                    if !state.is_terminal() {
                        state.complete();
                        state.current_step = None;
                        self.checkpoint(&mut state).await?;
                        tracing::info!(
                            run_id = %state.run_id,
                            seq = state.checkpoint_seq,
                            "Run completed"
                        );
                    }
                    return Ok(state);
                }
            }
        }
    }

    /// Dispatch one batch concurrently, await all, merge atomically,
    /// checkpoint.
    async fn dispatch_batch(
        &self,
        state: &mut RunState,
        names: Vec<StepName>,
    ) -> Result<(), OrchestratorError> {
        state.current_step = names.last().cloned();

        let mut handles: Vec<(StepName, JoinHandle<StepOutcome>)> = Vec::with_capacity(names.len());
        for name in &names {
            let step = self.registry.get(name).ok_or_else(|| {
                OrchestratorError::Validation(format!("step '{name}' is not registered"))
            })?;
            let ctx = StepContext {
                run_id: state.run_id.clone(),
                subject: state.subject.clone(),
                prior_results: state.step_results.clone(),
            };
            let timeout = self.options.step_timeout;
            tracing::debug!(run_id = %state.run_id, step = %name, "Dispatching step");
            handles.push((name.clone(), tokio::spawn(execute_step(step, ctx, timeout))));
        }

        let mut batch = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            // A panicked step is contained as a failure outcome; it must
            // not take down the run or its batch siblings.
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => StepOutcome::failure(
                    format!("step task panicked: {join_err}"),
                    Utc::now().to_rfc3339(),
                ),
            };
            state.record_attempt(&name);
            if outcome.is_success() {
                tracing::info!(
                    run_id = %state.run_id,
                    step = %name,
                    attempt = state.attempts(&name),
                    "Step succeeded"
                );
            } else {
                tracing::warn!(
                    run_id = %state.run_id,
                    step = %name,
                    attempt = state.attempts(&name),
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Step failed"
                );
            }
            batch.push((name, outcome));
        }

        state.merge_batch(batch)?;
        self.checkpoint(state).await
    }

    /// Run the aggregator over the full result mapping. Aggregation
    /// failure fails the run without retry: it depends on already-final
    /// step outputs.
    async fn run_aggregate(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        let agg_name = StepName::new(AGGREGATE_STEP);
        state.current_step = Some(agg_name.clone());

        let ctx = StepContext {
            run_id: state.run_id.clone(),
            subject: state.subject.clone(),
            prior_results: state.step_results.clone(),
        };
        let handle = tokio::spawn(execute_step(
            Arc::clone(&self.aggregator),
            ctx,
            self.options.step_timeout,
        ));
        // Same containment as batch dispatch: a panicking aggregator
        // becomes a failure outcome and fails the run instead of
        // unwinding out of the drive loop.
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => StepOutcome::failure(
                format!("step task panicked: {join_err}"),
                Utc::now().to_rfc3339(),
            ),
        };

        if outcome.is_success() {
            let payload = outcome
                .payload
                .clone()
                .unwrap_or(serde_json::Value::Null);
            state.set_aggregate(payload)?;
            state.merge_batch(vec![(agg_name, outcome)])?;
            tracing::info!(run_id = %state.run_id, "Aggregation completed");
        } else {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".into());
            state.merge_batch(vec![(agg_name, outcome)])?;
            tracing::error!(run_id = %state.run_id, "Aggregation failed: {error}");
            state.fail(format!("aggregation failed: {error}"));
        }
        self.checkpoint(state).await
    }

    /// Persist a snapshot with incremented sequence, retrying transient
    /// write failures with backoff. On exhaustion the run is marked
    /// failed with a checkpoint cause: the loop must never proceed past
    /// a failed checkpoint write or the resume invariant breaks.
    async fn checkpoint(&self, state: &mut RunState) -> Result<(), OrchestratorError> {
        state.checkpoint_seq += 1;
        let mut attempt = 0u32;
        let error = loop {
            attempt += 1;
            match self.save_snapshot(state.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        run_id = %state.run_id,
                        seq = state.checkpoint_seq,
                        "Checkpoint persisted"
                    );
                    return Ok(());
                }
                // A stale sequence means another driver advanced this
                // run; retrying cannot succeed.
                Err(error @ OrchestratorError::Checkpoint(CheckpointError::StaleSequence { .. })) => {
                    break error;
                }
                Err(error) if attempt <= self.options.checkpoint_write_retries => {
                    tracing::warn!(
                        run_id = %state.run_id,
                        seq = state.checkpoint_seq,
                        attempt,
                        "Checkpoint write failed, will retry: {error}"
                    );
                    tokio::time::sleep(compute_backoff(attempt)).await;
                }
                Err(error) => break error,
            }
        };

        tracing::error!(
            run_id = %state.run_id,
            seq = state.checkpoint_seq,
            attempts = attempt,
            "Checkpoint write failed, marking run failed: {error}"
        );
        state.fail(format!("checkpoint write failed: {error}"));
        state.checkpoint_seq += 1;
        if let Err(final_err) = self.save_snapshot(state.clone()).await {
            tracing::error!(
                run_id = %state.run_id,
                "Could not persist terminal failure snapshot: {final_err}"
            );
        }
        Err(error)
    }

    async fn save_snapshot(&self, snapshot: RunState) -> Result<(), OrchestratorError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| OrchestratorError::Infrastructure(anyhow!("store task panicked: {e}")))?
            .map_err(OrchestratorError::Checkpoint)
    }

    async fn load_latest(
        &self,
        run_id: &RunId,
    ) -> Result<Option<RunState>, OrchestratorError> {
        let store = Arc::clone(&self.store);
        let run_id = run_id.clone();
        tokio::task::spawn_blocking(move || store.load_latest(&run_id))
            .await
            .map_err(|e| OrchestratorError::Infrastructure(anyhow!("store task panicked: {e}")))?
            .map_err(OrchestratorError::Checkpoint)
    }
}

/// Execute one step under its deadline and wrap the result into an
/// outcome with timestamps.
async fn execute_step(step: Arc<dyn Step>, ctx: StepContext, timeout: Duration) -> StepOutcome {
    let started_at = Utc::now().to_rfc3339();
    match tokio::time::timeout(timeout, step.execute(ctx)).await {
        Ok(Ok(payload)) => StepOutcome::success(Some(payload), started_at),
        Ok(Err(error)) => StepOutcome::failure(error.to_string(), started_at),
        Err(_elapsed) => StepOutcome::failure(
            format!("timed out after {:.1}s", timeout.as_secs_f64()),
            started_at,
        ),
    }
}

/// Human-readable run-level error synthesized from the failed step set.
fn synthesize_failure_message(state: &RunState) -> String {
    let failed = state.failed_steps();
    if failed.is_empty() {
        return "run failed before any step produced an outcome".into();
    }
    let details: Vec<String> = failed
        .iter()
        .map(|name| {
            let error = state
                .step_results
                .get(name)
                .and_then(|o| o.error.as_deref())
                .unwrap_or("unknown error");
            format!("{name}: {error}")
        })
        .collect();
    format!(
        "{} of {} requested steps failed ({})",
        failed.len(),
        state.steps_requested.len(),
        details.join("; ")
    )
}
