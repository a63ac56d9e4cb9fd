//! Point-in-time view of every metric

use crate::observation::MetricKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Summaries for every metric that received at least one observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Run time the per-second counter rates are computed over
    pub duration: Duration,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// Counter total, or 0 when the counter never fired
    pub fn counter(&self, name: &str) -> f64 {
        match self.metrics.get(name) {
            Some(MetricSummary::Counter { count, .. }) => *count,
            _ => 0.0,
        }
    }
}

/// Aggregates of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricSummary {
    Counter {
        /// Sum of all increments
        count: f64,
        /// `count` per second of run time
        rate: f64,
    },
    Rate {
        /// Samples equal to 1
        passes: u64,
        total: u64,
        /// `passes / total`
        rate: f64,
    },
    Trend(TrendSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter { .. } => MetricKind::Counter,
            MetricSummary::Rate { .. } => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Distribution of a trend's retained samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(skip)]
    sorted: Vec<f64>,
}

impl TrendSummary {
    /// Summarise samples in any order; `None` when there are none
    pub fn from_samples(mut samples: Vec<f64>) -> Option<Self> {
        samples.sort_by(f64::total_cmp);
        let count = samples.len();
        let (&min, &max) = (samples.first()?, samples.last()?);
        // Summed in sorted order so the result does not depend on arrival order
        let avg = samples.iter().sum::<f64>() / count as f64;

        Some(Self {
            count: count as u64,
            min,
            max,
            avg,
            med: nearest_rank(&samples, 50.0)?,
            p90: nearest_rank(&samples, 90.0)?,
            p95: nearest_rank(&samples, 95.0)?,
            p99: nearest_rank(&samples, 99.0)?,
            sorted: samples,
        })
    }

    /// Any percentile in `0..=100`
    pub fn percentile(&self, p: f64) -> f64 {
        nearest_rank(&self.sorted, p).unwrap_or(self.max)
    }
}

/// Nearest-rank percentile over ascending samples: the value at rank
/// `ceil(p * n / 100)`, with rank clamped to `1..=n`. Multiplying before
/// dividing keeps `p * n` exact for whole percentiles, so the rank never
/// lands one past an integer.
pub fn nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p * n as f64 / 100.0).ceil() as usize;
    let index = rank.clamp(1, n) - 1;
    sorted.get(index).copied()
}
