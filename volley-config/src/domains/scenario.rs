//! Scenario configuration: executor kind, ramp schedule and pool bounds

use crate::domains::script::ScriptConfig;
use crate::error::ConfigResult;
use crate::validation::{
    validate_non_negative, validate_positive, validate_required_string, validate_url,
    validate_variable_name, Validatable,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// How a scenario turns its schedule into load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Stage targets are arrivals per `time_unit`, issued independently of
    /// how long earlier transactions take
    #[serde(alias = "ramping-arrival-rate", alias = "constant-arrival-rate")]
    OpenArrivalRate,

    /// Stage targets are a live count of virtual users, each looping
    /// transaction after transaction
    #[serde(alias = "ramping-vus", alias = "constant-vus")]
    ClosedVuCount,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::OpenArrivalRate => write!(f, "open-arrival-rate"),
            ExecutorKind::ClosedVuCount => write!(f, "closed-vu-count"),
        }
    }
}

/// One segment of a ramp schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// How long the ramp towards `target` lasts
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Rate (per time unit) or VU count reached at the end of the stage
    pub target: f64,
}

impl StageConfig {
    pub fn new(duration: Duration, target: f64) -> Self {
        Self { duration, target }
    }
}

/// A named load pattern paired with the transaction it drives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Unique name within the run
    pub name: String,

    pub executor: ExecutorKind,

    /// Rate or VU count at t=0. Defaults to 0 for staged schedules and to
    /// `target` for the constant form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_target: Option<f64>,

    /// Unit the open-model targets are expressed in
    #[serde(with = "humantime_serde", default = "default_time_unit")]
    pub time_unit: Duration,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageConfig>,

    /// Constant schedule: total duration (use instead of `stages`)
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,

    /// Constant schedule: rate or VU count held for `duration`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,

    /// Workers created before the first arrival
    #[serde(default = "default_pre_allocated")]
    pub pre_allocated: usize,

    /// Upper bound on concurrent workers; defaults to `pre_allocated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,

    /// Arrivals allowed to wait for a free worker before new ones are dropped
    #[serde(default)]
    pub max_backlog: usize,

    /// Time in-flight transactions get to finish after the schedule ends
    #[serde(with = "humantime_serde", default = "default_graceful_stop")]
    pub graceful_stop: Duration,

    /// Target base URL, exposed to templates as `base_url`. Accepts
    /// `${NAME:-default}` environment references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Extra template variables shared by every transaction of the
    /// scenario, e.g. the URLs of further services one journey calls.
    /// Values accept `${NAME:-default}` environment references.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,

    pub script: ScriptConfig,
}

impl ScenarioConfig {
    /// Starting level and stage list, with the constant form expanded
    pub fn schedule(&self) -> (f64, Vec<StageConfig>) {
        if !self.stages.is_empty() {
            return (self.start_target.unwrap_or(0.0), self.stages.clone());
        }

        match (self.duration, self.target) {
            (Some(duration), Some(target)) => (
                self.start_target.unwrap_or(target),
                vec![StageConfig::new(duration, target)],
            ),
            _ => (self.start_target.unwrap_or(0.0), Vec::new()),
        }
    }

    /// Effective worker ceiling
    pub fn max_workers(&self) -> usize {
        self.max.unwrap_or(self.pre_allocated)
    }

    /// Sum of all stage durations
    pub fn total_duration(&self) -> Duration {
        self.schedule().1.iter().map(|s| s.duration).sum()
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;

        let constant_form = self.duration.is_some() || self.target.is_some();
        if !self.stages.is_empty() && constant_form {
            return Err(self.validation_error(format!(
                "scenario '{}' sets both stages and duration/target",
                self.name
            )));
        }
        if self.stages.is_empty() && (self.duration.is_none() || self.target.is_none()) {
            return Err(self.validation_error(format!(
                "scenario '{}' needs a non-empty stages list or both duration and target",
                self.name
            )));
        }

        let (start, stages) = self.schedule();
        validate_non_negative(start, "start_target", self.domain_name())?;
        for (index, stage) in stages.iter().enumerate() {
            validate_non_negative(
                stage.target,
                &format!("stages[{}].target", index),
                self.domain_name(),
            )?;
            if stage.duration.is_zero() {
                log::warn!(
                    "scenario '{}' stage {} has zero duration; its target applies as a step change",
                    self.name,
                    index
                );
            }
        }
        if self.total_duration().is_zero() {
            return Err(self.validation_error(format!(
                "scenario '{}' schedule has zero total duration",
                self.name
            )));
        }

        validate_positive(self.time_unit.as_nanos(), "time_unit", self.domain_name())?;
        validate_positive(self.max_workers(), "max", self.domain_name())?;
        if self.pre_allocated > self.max_workers() {
            return Err(self.validation_error(format!(
                "scenario '{}' pre_allocated ({}) exceeds max ({})",
                self.name,
                self.pre_allocated,
                self.max_workers()
            )));
        }

        if self.executor == ExecutorKind::ClosedVuCount {
            let peak = stages
                .iter()
                .map(|s| s.target)
                .fold(start, f64::max)
                .ceil() as usize;
            if peak > self.max_workers() {
                log::warn!(
                    "scenario '{}' peaks at {} VUs but max is {}; VU count will be capped",
                    self.name,
                    peak,
                    self.max_workers()
                );
            }
        }

        if let Some(ref base_url) = self.base_url {
            validate_url(base_url, "base_url", self.domain_name())?;
        }
        for name in self.vars.keys() {
            validate_variable_name(name, "vars", self.domain_name())?;
        }

        self.script.validate()
    }

    fn domain_name(&self) -> &'static str {
        "scenario"
    }
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_pre_allocated() -> usize {
    1
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}
