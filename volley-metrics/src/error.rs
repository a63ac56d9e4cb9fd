//! Threshold and metric registry errors

use crate::observation::MetricKind;
use thiserror::Error;

/// Problems found while parsing thresholds or registering metrics. All of
/// them are configuration errors, reported before any traffic is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("invalid threshold '{expression}' on {metric}: {reason}")]
    InvalidExpression {
        metric: String,
        expression: String,
        reason: String,
    },

    #[error("threshold on unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("threshold '{expression}' uses '{aggregate}', which {kind} metric '{metric}' does not provide")]
    UnsupportedAggregate {
        metric: String,
        expression: String,
        aggregate: String,
        kind: MetricKind,
    },

    #[error("metric '{name}' registered as {existing} and {requested}")]
    KindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}

pub type ThresholdResult<T> = Result<T, ThresholdError>;
