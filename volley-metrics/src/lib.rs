//! Metrics for volley runs
//!
//! Workers emit [`Observation`]s into one shared [`MetricSink`]. At the end
//! of a run the sink is frozen into a [`MetricsSnapshot`], and the
//! [`Threshold`]s declared in configuration are evaluated against it.

pub mod builtin;
pub mod error;
pub mod observation;
pub mod registry;
pub mod sink;
pub mod snapshot;
pub mod threshold;

pub use error::{ThresholdError, ThresholdResult};
pub use observation::{MetricKind, Observation};
pub use registry::MetricRegistry;
pub use sink::MetricSink;
pub use snapshot::{nearest_rank, MetricSummary, MetricsSnapshot, TrendSummary};
pub use threshold::{
    all_passed, evaluate, Aggregate, Comparison, Threshold, ThresholdOutcome, Verdict,
};
