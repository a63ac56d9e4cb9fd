//! The outcome of a run

use crate::worker::ScenarioReport;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use volley_metrics::{builtin, MetricSummary, MetricsSnapshot, ThresholdOutcome, Verdict};

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every scenario's schedule elapsed and its workers drained
    Completed,
    /// The run-wide timeout fired first
    Timeout,
    /// Someone asked the run to stop
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => write!(f, "completed"),
            StopReason::Timeout => write!(f, "timeout"),
            StopReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Frozen metrics, threshold verdicts and totals for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub snapshot: MetricsSnapshot,
    pub thresholds: Vec<ThresholdOutcome>,
    /// Every threshold passed; true when none were declared
    pub passed: bool,
    pub duration: Duration,
    /// Transactions that ran to completion
    pub iterations: u64,
    /// Failed requests, worker faults and steps skipped for missing references
    pub errors: u64,
    pub dropped: u64,
    pub stop_reason: StopReason,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunResult {
    pub fn new(
        snapshot: MetricsSnapshot,
        thresholds: Vec<ThresholdOutcome>,
        stop_reason: StopReason,
        scenarios: Vec<ScenarioReport>,
    ) -> Self {
        let passed = volley_metrics::all_passed(&thresholds);
        let failed_requests = match snapshot.get(builtin::HTTP_REQ_FAILED) {
            Some(MetricSummary::Rate { passes, .. }) => *passes,
            _ => 0,
        };
        let errors = failed_requests
            + snapshot.counter(builtin::WORKER_ERRORS) as u64
            + snapshot.counter(builtin::MISSING_REFERENCES) as u64;

        Self {
            duration: snapshot.duration,
            iterations: snapshot.counter(builtin::ITERATIONS) as u64,
            dropped: snapshot.counter(builtin::DROPPED_ITERATIONS) as u64,
            errors,
            passed,
            thresholds,
            stop_reason,
            scenarios,
            snapshot,
        }
    }

    /// Thresholds that did not pass, indeterminate ones included
    pub fn unmet_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds
            .iter()
            .filter(|outcome| outcome.verdict != Verdict::Pass)
    }

    /// Fraction of requests that failed, if any were issued
    pub fn error_rate(&self) -> Option<f64> {
        match self.snapshot.get(builtin::HTTP_REQ_FAILED) {
            Some(MetricSummary::Rate { rate, .. }) => Some(*rate),
            _ => None,
        }
    }
}
