//! Routing: pure decision functions over run state.
//!
//! [`next_action`] performs no I/O and consults only the run state plus
//! a fixed [`RoutingPolicy`], so routing is deterministically unit
//! testable. Sequencing is expressed solely through the optional gating
//! step; all otherwise-eligible steps are dispatched together.

use serde::{Deserialize, Serialize};
use stockflow_types::{RunState, RunStatus, StepName, StepStatus};

/// What the engine should do next for a given run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Dispatch these steps concurrently and await all of them.
    Dispatch(Vec<StepName>),
    /// Every requested step is terminal; run the aggregator.
    Aggregate,
    /// The run cannot make progress; mark it failed.
    Fail,
    /// The run is finished.
    Done,
}

/// Whether a run may complete with individual steps terminally failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Aggregate over whatever succeeded; the run fails only when every
    /// requested step failed.
    #[default]
    PartialSuccess,
    /// Any terminally failed step fails the whole run.
    AllMustSucceed,
}

/// Fixed routing parameters for a run.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    /// Step that must terminally succeed before any other step becomes
    /// eligible. `None` means all requested steps are eligible
    /// immediately and may run fully concurrently.
    pub gating_step: Option<StepName>,
    /// Additional attempts allowed per step after the first failure.
    pub max_retries: u32,
    pub completion: CompletionPolicy,
}

/// Whether `name` has a terminal outcome: a success, or a failure with
/// no retry budget left.
fn is_settled(state: &RunState, policy: &RoutingPolicy, name: &StepName) -> bool {
    match state.step_results.get(name).map(|o| o.status) {
        Some(StepStatus::Success) => true,
        Some(StepStatus::Failed) => state.attempts(name) > policy.max_retries,
        None => false,
    }
}

fn is_settled_failure(state: &RunState, policy: &RoutingPolicy, name: &StepName) -> bool {
    is_settled(state, policy, name)
        && state
            .step_results
            .get(name)
            .is_some_and(|o| o.status == StepStatus::Failed)
}

/// Select the next action for `state`.
///
/// Pure function: repeated calls on the same state return the same
/// action. Candidate order follows `steps_requested`.
#[must_use]
pub fn next_action(state: &RunState, policy: &RoutingPolicy) -> NextAction {
    // A terminal run never routes anywhere else.
    match state.status {
        RunStatus::Completed => return NextAction::Done,
        RunStatus::Failed => return NextAction::Fail,
        RunStatus::Pending | RunStatus::Running => {}
    }

    let remaining: Vec<StepName> = state
        .steps_requested
        .iter()
        .filter(|name| !is_settled(state, policy, name))
        .cloned()
        .collect();

    if !remaining.is_empty() {
        if let Some(gate) = policy
            .gating_step
            .as_ref()
            .filter(|gate| state.steps_requested.contains(gate))
        {
            let gate_succeeded = state
                .step_results
                .get(gate)
                .is_some_and(|o| o.status == StepStatus::Success);
            if !gate_succeeded {
                // Gate exhausted its retries: dependents can never become
                // eligible, so the run cannot make progress.
                if is_settled_failure(state, policy, gate) {
                    return NextAction::Fail;
                }
                return NextAction::Dispatch(vec![gate.clone()]);
            }
        }
        return NextAction::Dispatch(remaining);
    }

    // Every requested step is settled.
    let succeeded = state.succeeded_steps();
    let failed = state.failed_steps();

    if succeeded.is_empty() {
        return NextAction::Fail;
    }
    if policy.completion == CompletionPolicy::AllMustSucceed && !failed.is_empty() {
        return NextAction::Fail;
    }
    if state.aggregate_result.is_none() {
        return NextAction::Aggregate;
    }
    NextAction::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockflow_types::{RunId, StepOutcome};

    fn state(steps: &[&str]) -> RunState {
        let mut s = RunState::new(
            RunId::new("run-1"),
            "AAPL",
            steps.iter().copied().map(StepName::new).collect(),
        );
        s.mark_running();
        s
    }

    fn policy(max_retries: u32) -> RoutingPolicy {
        RoutingPolicy {
            gating_step: None,
            max_retries,
            completion: CompletionPolicy::PartialSuccess,
        }
    }

    fn succeed(s: &mut RunState, name: &str) {
        s.record_attempt(&StepName::new(name));
        s.merge_batch(vec![(
            StepName::new(name),
            StepOutcome::success(None, Utc::now().to_rfc3339()),
        )])
        .unwrap();
    }

    fn fail_once(s: &mut RunState, name: &str) {
        s.record_attempt(&StepName::new(name));
        s.merge_batch(vec![(
            StepName::new(name),
            StepOutcome::failure("boom", Utc::now().to_rfc3339()),
        )])
        .unwrap();
    }

    #[test]
    fn fresh_run_dispatches_all_requested() {
        let s = state(&["technical", "fundamentals", "news"]);
        let action = next_action(&s, &policy(1));
        assert_eq!(
            action,
            NextAction::Dispatch(vec![
                StepName::new("technical"),
                StepName::new("fundamentals"),
                StepName::new("news"),
            ])
        );
    }

    #[test]
    fn routing_is_deterministic() {
        let mut s = state(&["technical", "news"]);
        succeed(&mut s, "technical");
        fail_once(&mut s, "news");
        let p = policy(2);
        assert_eq!(next_action(&s, &p), next_action(&s, &p));
    }

    #[test]
    fn successful_step_never_redispatched() {
        let mut s = state(&["technical", "news"]);
        succeed(&mut s, "technical");
        match next_action(&s, &policy(1)) {
            NextAction::Dispatch(names) => {
                assert_eq!(names, vec![StepName::new("news")]);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn failed_step_with_budget_redispatched() {
        let mut s = state(&["news"]);
        fail_once(&mut s, "news");
        assert_eq!(
            next_action(&s, &policy(1)),
            NextAction::Dispatch(vec![StepName::new("news")])
        );
    }

    #[test]
    fn exhausted_step_not_redispatched() {
        let mut s = state(&["technical", "news"]);
        succeed(&mut s, "technical");
        // max_retries = 1 allows two attempts total.
        fail_once(&mut s, "news");
        fail_once(&mut s, "news");
        assert_eq!(next_action(&s, &policy(1)), NextAction::Aggregate);
    }

    #[test]
    fn all_failed_routes_to_fail() {
        let mut s = state(&["news"]);
        fail_once(&mut s, "news");
        assert_eq!(next_action(&s, &policy(0)), NextAction::Fail);
    }

    #[test]
    fn partial_success_aggregates_then_done() {
        let mut s = state(&["technical", "news"]);
        succeed(&mut s, "technical");
        fail_once(&mut s, "news");
        let p = policy(0);
        assert_eq!(next_action(&s, &p), NextAction::Aggregate);

        s.set_aggregate(serde_json::json!({"overall_score": 7.5})).unwrap();
        assert_eq!(next_action(&s, &p), NextAction::Done);
    }

    #[test]
    fn all_must_succeed_fails_on_any_failure() {
        let mut s = state(&["technical", "news"]);
        succeed(&mut s, "technical");
        fail_once(&mut s, "news");
        let p = RoutingPolicy {
            completion: CompletionPolicy::AllMustSucceed,
            ..policy(0)
        };
        assert_eq!(next_action(&s, &p), NextAction::Fail);
    }

    #[test]
    fn gating_step_dispatched_alone_first() {
        let s = state(&["technical", "fundamentals", "news"]);
        let p = RoutingPolicy {
            gating_step: Some(StepName::new("technical")),
            ..policy(1)
        };
        assert_eq!(
            next_action(&s, &p),
            NextAction::Dispatch(vec![StepName::new("technical")])
        );
    }

    #[test]
    fn gate_success_releases_remaining_together() {
        let mut s = state(&["technical", "fundamentals", "news"]);
        succeed(&mut s, "technical");
        let p = RoutingPolicy {
            gating_step: Some(StepName::new("technical")),
            ..policy(1)
        };
        assert_eq!(
            next_action(&s, &p),
            NextAction::Dispatch(vec![StepName::new("fundamentals"), StepName::new("news")])
        );
    }

    #[test]
    fn gate_retried_before_failing_run() {
        let mut s = state(&["technical", "news"]);
        fail_once(&mut s, "technical");
        let p = RoutingPolicy {
            gating_step: Some(StepName::new("technical")),
            ..policy(1)
        };
        assert_eq!(
            next_action(&s, &p),
            NextAction::Dispatch(vec![StepName::new("technical")])
        );
    }

    #[test]
    fn exhausted_gate_fails_run() {
        let mut s = state(&["technical", "news"]);
        fail_once(&mut s, "technical");
        let p = RoutingPolicy {
            gating_step: Some(StepName::new("technical")),
            ..policy(0)
        };
        assert_eq!(next_action(&s, &p), NextAction::Fail);
    }

    #[test]
    fn gating_step_outside_request_is_ignored() {
        let s = state(&["news"]);
        let p = RoutingPolicy {
            gating_step: Some(StepName::new("technical")),
            ..policy(0)
        };
        assert_eq!(
            next_action(&s, &p),
            NextAction::Dispatch(vec![StepName::new("news")])
        );
    }

    #[test]
    fn terminal_status_short_circuits() {
        let mut s = state(&["news"]);
        s.complete();
        assert_eq!(next_action(&s, &policy(0)), NextAction::Done);

        let mut s = state(&["news"]);
        s.fail("boom");
        assert_eq!(next_action(&s, &policy(0)), NextAction::Fail);
    }
}
