//! The set of metrics a run is able to produce

use crate::builtin;
use crate::error::{ThresholdError, ThresholdResult};
use crate::observation::MetricKind;
use std::collections::BTreeMap;

/// Metric names and kinds known before the run starts. Thresholds are
/// checked against it so a typo fails at start instead of evaluating as
/// indeterminate at the end.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    kinds: BTreeMap<String, MetricKind>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in metrics
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, kind) in [
            (builtin::HTTP_REQS, MetricKind::Counter),
            (builtin::HTTP_REQ_DURATION, MetricKind::Trend),
            (builtin::HTTP_REQ_FAILED, MetricKind::Rate),
            (builtin::CHECKS, MetricKind::Rate),
            (builtin::ITERATIONS, MetricKind::Counter),
            (builtin::ITERATION_DURATION, MetricKind::Trend),
            (builtin::DROPPED_ITERATIONS, MetricKind::Counter),
            (builtin::MISSING_REFERENCES, MetricKind::Counter),
            (builtin::WORKER_ERRORS, MetricKind::Counter),
        ] {
            registry.kinds.insert(name.to_string(), kind);
        }
        registry
    }

    /// Add a metric. Registering the same name twice is fine as long as the
    /// kind agrees.
    pub fn register(&mut self, name: &str, kind: MetricKind) -> ThresholdResult<()> {
        match self.kinds.get(name) {
            Some(existing) if *existing != kind => Err(ThresholdError::KindConflict {
                name: name.to_string(),
                existing: *existing,
                requested: kind,
            }),
            Some(_) => Ok(()),
            None => {
                self.kinds.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.kinds.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = MetricRegistry::with_builtins();
        assert_eq!(registry.kind("http_req_duration"), Some(MetricKind::Trend));
        assert_eq!(registry.kind("http_req_failed"), Some(MetricKind::Rate));
        assert_eq!(registry.kind("dropped_iterations"), Some(MetricKind::Counter));
        assert_eq!(registry.kind("nope"), None);
    }

    #[test]
    fn test_conflicting_kind_rejected() {
        let mut registry = MetricRegistry::with_builtins();
        assert!(registry.register("create_order", MetricKind::Trend).is_ok());
        assert!(registry.register("create_order", MetricKind::Trend).is_ok());
        assert!(matches!(
            registry.register("checks", MetricKind::Trend),
            Err(ThresholdError::KindConflict { .. })
        ));
    }
}
