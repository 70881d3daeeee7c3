//! Step capability trait.
//!
//! The engine depends only on this contract, never on concrete step
//! types. Implementations perform the actual collection work (market
//! data, filings, news feeds); the engine wraps whatever they return
//! into a [`StepOutcome`](stockflow_types::StepOutcome) with timestamps
//! and charges failures against the retry budget.

use async_trait::async_trait;
use stockflow_types::{StepContext, StepName};

/// One named unit of work with a success/failure outcome.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn Step>`. `execute` may block on external I/O; the engine
/// bounds it with a per-dispatch deadline. Steps must not assume
/// exactly-once execution: a crash between execution and checkpoint
/// means the step runs again on resume, so side effects must be safe to
/// re-run.
#[async_trait]
pub trait Step: Send + Sync {
    /// Declared name, used for registry lookup and result keying.
    fn name(&self) -> StepName;

    /// Perform the work. A returned error (or a deadline overrun) is
    /// recorded as a failure outcome; it never aborts sibling steps in
    /// the same batch.
    async fn execute(&self, ctx: StepContext) -> anyhow::Result<serde_json::Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn Step`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn Step) {}
    }
}
