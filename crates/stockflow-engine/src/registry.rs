//! Name-to-implementation step registry.
//!
//! The orchestrator resolves dispatched step names through this
//! mapping; unknown names are rejected at submission time so the drive
//! loop never encounters them.

use std::collections::BTreeMap;
use std::sync::Arc;

use stockflow_types::StepName;

use crate::step::Step;

/// Registry of executable steps, keyed by declared name.
#[derive(Default)]
pub struct StepRegistry {
    steps: BTreeMap<StepName, Arc<dyn Step>>,
}

impl StepRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under its declared name. A later registration
    /// for the same name replaces the earlier one.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.name(), step);
    }

    /// Look up a step by name.
    #[must_use]
    pub fn get(&self, name: &StepName) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &StepName) -> bool {
        self.steps.contains_key(name)
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<StepName> {
        self.steps.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stockflow_types::StepContext;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Step for Named {
        fn name(&self) -> StepName {
            StepName::new(self.0)
        }

        async fn execute(&self, _ctx: StepContext) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({ "tag": self.1 }))
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(Named("technical", "a")));
        registry.register(Arc::new(Named("news", "b")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&StepName::new("technical")));
        assert!(!registry.contains(&StepName::new("filings")));
        assert!(registry.get(&StepName::new("news")).is_some());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(Named("technical", "old")));
        registry.register(Arc::new(Named("technical", "new")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(Named("news", "a")));
        registry.register(Arc::new(Named("fundamentals", "b")));
        let names: Vec<String> = registry.names().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["fundamentals", "news"]);
    }
}
