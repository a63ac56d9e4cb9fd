//! Threshold parsing and evaluation
//!
//! An expression is `<aggregate> <op> <literal>`, for example `p(95)<2000`,
//! `rate<0.1` or `count >= 100`. Evaluation is a pure function of a
//! [`MetricsSnapshot`].

use crate::error::{ThresholdError, ThresholdResult};
use crate::observation::MetricKind;
use crate::registry::MetricRegistry;
use crate::snapshot::{MetricSummary, MetricsSnapshot};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

static EXPRESSION: OnceLock<Regex> = OnceLock::new();

fn expression_pattern() -> &'static Regex {
    EXPRESSION.get_or_init(|| {
        Regex::new(
            r"^\s*(count|rate|avg|min|max|med|p\(\s*([0-9]+(?:\.[0-9]+)?)\s*\)|p([0-9]+(?:\.[0-9]+)?))\s*(<=|>=|<|>)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$",
        )
        .expect("threshold pattern is valid")
    })
}

/// Left side of a threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// Counter total, rate passes, or trend sample count
    Count,
    /// Counter per second, or fraction of 1-samples for a rate metric
    Rate,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl Aggregate {
    fn supported_by(&self, kind: MetricKind) -> bool {
        match (self, kind) {
            (Aggregate::Count, _) => true,
            (Aggregate::Rate, MetricKind::Counter | MetricKind::Rate) => true,
            (Aggregate::Rate, MetricKind::Trend) => false,
            (_, MetricKind::Trend) => true,
            _ => false,
        }
    }

    fn value(&self, summary: &MetricSummary) -> Option<f64> {
        match (self, summary) {
            (Aggregate::Count, MetricSummary::Counter { count, .. }) => Some(*count),
            (Aggregate::Rate, MetricSummary::Counter { rate, .. }) => Some(*rate),
            (Aggregate::Count, MetricSummary::Rate { passes, .. }) => Some(*passes as f64),
            (Aggregate::Rate, MetricSummary::Rate { rate, .. }) => Some(*rate),
            (Aggregate::Count, MetricSummary::Trend(t)) => Some(t.count as f64),
            (Aggregate::Avg, MetricSummary::Trend(t)) => Some(t.avg),
            (Aggregate::Min, MetricSummary::Trend(t)) => Some(t.min),
            (Aggregate::Max, MetricSummary::Trend(t)) => Some(t.max),
            (Aggregate::Med, MetricSummary::Trend(t)) => Some(t.med),
            (Aggregate::Percentile(p), MetricSummary::Trend(t)) => Some(t.percentile(*p)),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => write!(f, "count"),
            Aggregate::Rate => write!(f, "rate"),
            Aggregate::Avg => write!(f, "avg"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Max => write!(f, "max"),
            Aggregate::Med => write!(f, "med"),
            Aggregate::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        })
    }
}

/// A parsed pass/fail criterion on one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: String,
    /// Expression as written in configuration
    pub expression: String,
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub limit: f64,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> ThresholdResult<Self> {
        let invalid = |reason: &str| ThresholdError::InvalidExpression {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let captures = expression_pattern()
            .captures(expression)
            .ok_or_else(|| invalid("expected '<aggregate> <op> <number>'"))?;

        let aggregate = match (captures.get(2).or_else(|| captures.get(3)), &captures[1]) {
            (Some(p), _) => {
                let p: f64 = p
                    .as_str()
                    .parse()
                    .map_err(|_| invalid("percentile is not a number"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregate::Percentile(p)
            }
            (None, "count") => Aggregate::Count,
            (None, "rate") => Aggregate::Rate,
            (None, "avg") => Aggregate::Avg,
            (None, "min") => Aggregate::Min,
            (None, "max") => Aggregate::Max,
            (None, "med") => Aggregate::Med,
            (None, _) => return Err(invalid("unknown aggregate")),
        };

        let comparison = match &captures[4] {
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => return Err(invalid("unknown comparison")),
        };

        let limit: f64 = captures[5]
            .parse()
            .map_err(|_| invalid("limit is not a number"))?;

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            aggregate,
            comparison,
            limit,
        })
    }

    /// Reject thresholds on metrics the run cannot produce, or aggregates
    /// the metric's kind does not provide
    pub fn check_against(&self, registry: &MetricRegistry) -> ThresholdResult<()> {
        let kind = registry
            .kind(&self.metric)
            .ok_or_else(|| ThresholdError::UnknownMetric(self.metric.clone()))?;
        if !self.aggregate.supported_by(kind) {
            return Err(ThresholdError::UnsupportedAggregate {
                metric: self.metric.clone(),
                expression: self.expression.clone(),
                aggregate: self.aggregate.to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// Evaluate against a snapshot
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdOutcome {
        let observed = snapshot
            .get(&self.metric)
            .and_then(|summary| self.aggregate.value(summary));

        let verdict = match observed {
            Some(value) if self.comparison.holds(value, self.limit) => Verdict::Pass,
            Some(_) => Verdict::Fail,
            None => Verdict::Indeterminate,
        };

        ThresholdOutcome {
            threshold: self.clone(),
            observed,
            verdict,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression)
    }
}

/// Result of one threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// The metric received no observations
    Indeterminate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    /// Aggregate value, absent when indeterminate
    pub observed: Option<f64>,
    pub verdict: Verdict,
}

/// Evaluate every threshold against the same snapshot
pub fn evaluate(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Vec<ThresholdOutcome> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}

/// Overall verdict: every threshold passed (vacuously true with none)
pub fn all_passed(outcomes: &[ThresholdOutcome]) -> bool {
    outcomes.iter().all(|o| o.verdict == Verdict::Pass)
}
