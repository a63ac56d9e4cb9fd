//! Observations: the single unit of data flowing into the sink

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a metric accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Values are summed
    Counter,
    /// Samples are 0 or 1; tracks the fraction of 1s
    Rate,
    /// Samples are retained for percentile queries
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Trend => write!(f, "trend"),
        }
    }
}

/// One immutable measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub metric: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    fn new(metric: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            metric: metric.into(),
            kind,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Counter increment
    pub fn counter(metric: impl Into<String>, value: f64) -> Self {
        Self::new(metric, MetricKind::Counter, value)
    }

    /// Rate sample: 1 when `hit`, 0 otherwise
    pub fn rate(metric: impl Into<String>, hit: bool) -> Self {
        Self::new(metric, MetricKind::Rate, if hit { 1.0 } else { 0.0 })
    }

    /// Trend sample in milliseconds
    pub fn trend(metric: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(metric, MetricKind::Trend, elapsed.as_secs_f64() * 1000.0)
    }

    /// Trend sample with a raw value
    pub fn trend_value(metric: impl Into<String>, value: f64) -> Self {
        Self::new(metric, MetricKind::Trend, value)
    }
}
