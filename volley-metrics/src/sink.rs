//! Lock-striped metric accumulation shared by every worker of a run

use crate::observation::{MetricKind, Observation};
use crate::snapshot::{MetricSummary, MetricsSnapshot, TrendSummary};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const DEFAULT_STRIPES: usize = 32;

#[derive(Debug)]
enum Accumulator {
    Counter { sum: f64 },
    Rate { passes: u64, total: u64 },
    Trend { samples: Vec<f64> },
}

impl Accumulator {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Accumulator::Counter { sum: 0.0 },
            MetricKind::Rate => Accumulator::Rate {
                passes: 0,
                total: 0,
            },
            MetricKind::Trend => Accumulator::Trend {
                samples: Vec::new(),
            },
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Accumulator::Counter { .. } => MetricKind::Counter,
            Accumulator::Rate { .. } => MetricKind::Rate,
            Accumulator::Trend { .. } => MetricKind::Trend,
        }
    }

    fn add(&mut self, value: f64) {
        match self {
            Accumulator::Counter { sum } => *sum += value,
            Accumulator::Rate { passes, total } => {
                *total += 1;
                if value != 0.0 {
                    *passes += 1;
                }
            }
            Accumulator::Trend { samples } => samples.push(value),
        }
    }

    fn summarize(&self, duration: Duration) -> Option<MetricSummary> {
        match self {
            Accumulator::Counter { sum } => {
                let secs = duration.as_secs_f64();
                Some(MetricSummary::Counter {
                    count: *sum,
                    rate: if secs > 0.0 { *sum / secs } else { 0.0 },
                })
            }
            Accumulator::Rate { passes, total } => Some(MetricSummary::Rate {
                passes: *passes,
                total: *total,
                rate: if *total > 0 {
                    *passes as f64 / *total as f64
                } else {
                    0.0
                },
            }),
            Accumulator::Trend { samples } => {
                TrendSummary::from_samples(samples.clone()).map(MetricSummary::Trend)
            }
        }
    }
}

/// Thread-safe sink for observations from all scenarios.
///
/// Metrics are spread over independently locked stripes by name hash, so
/// writers to different metrics rarely contend. Every accumulation is
/// commutative: the same multiset of observations yields the same snapshot
/// regardless of arrival order.
#[derive(Debug)]
pub struct MetricSink {
    stripes: Box<[Mutex<HashMap<String, Accumulator>>]>,
    hasher: ahash::RandomState,
    frozen: AtomicBool,
    rejected: AtomicU64,
}

impl MetricSink {
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1))
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            hasher: ahash::RandomState::new(),
            frozen: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        }
    }

    fn stripe(&self, name: &str) -> &Mutex<HashMap<String, Accumulator>> {
        let index = (self.hasher.hash_one(name) as usize) % self.stripes.len();
        &self.stripes[index]
    }

    /// Accumulate one observation. Returns `false` if it was ignored because
    /// the sink is frozen or the name is already bound to another kind.
    pub fn record(&self, observation: Observation) -> bool {
        if self.frozen.load(Ordering::Acquire) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut stripe = self.stripe(&observation.metric).lock();
        let kind = observation.kind;
        let accumulator = stripe
            .entry(observation.metric)
            .or_insert_with(|| Accumulator::new(kind));

        if accumulator.kind() != kind {
            debug!(
                "Ignoring {} observation for {} metric",
                kind,
                accumulator.kind()
            );
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        accumulator.add(observation.value);
        true
    }

    pub fn record_all(&self, observations: impl IntoIterator<Item = Observation>) {
        for observation in observations {
            self.record(observation);
        }
    }

    /// Observations ignored so far
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Summarise every metric; counter rates are per second of `elapsed`
    pub fn snapshot(&self, elapsed: Duration) -> MetricsSnapshot {
        let mut metrics = BTreeMap::new();
        for stripe in self.stripes.iter() {
            let stripe = stripe.lock();
            for (name, accumulator) in stripe.iter() {
                if let Some(summary) = accumulator.summarize(elapsed) {
                    metrics.insert(name.clone(), summary);
                }
            }
        }
        MetricsSnapshot {
            duration: elapsed,
            metrics,
        }
    }

    /// Stop accepting observations and take the final snapshot
    pub fn freeze(&self, elapsed: Duration) -> MetricsSnapshot {
        self.frozen.store(true, Ordering::Release);
        self.snapshot(elapsed)
    }
}

impl Default for MetricSink {
    fn default() -> Self {
        Self::new()
    }
}
