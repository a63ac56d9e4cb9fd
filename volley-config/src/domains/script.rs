//! Declarative transaction scripts: ordered steps with checks, extractions
//! and post-step delays

use crate::error::ConfigResult;
use crate::validation::{
    validate_enum_choice, validate_positive, validate_required_string, validate_unique_names,
    validate_variable_name, Validatable,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// One logical user journey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub name: String,
    pub steps: Vec<StepConfig>,
}

/// A single request in a journey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name; also the name of the Trend recording its latency
    pub name: String,

    /// Variables rendered before the request and kept for the rest of the
    /// transaction. Values are templates; output that parses as JSON is
    /// stored as that value, anything else as a string.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,

    pub request: RequestConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckConfig>,

    /// Correlation values pulled from the response, keyed by variable name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extract: BTreeMap<String, ExtractionPaths>,

    /// Pause after the step; never counted in latency trends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayConfig>,

    /// Only run on iterations where `iteration % every == 0`
    #[serde(default = "default_every")]
    pub every: u64,

    /// Extra Rate metric fed 1 when the step failed and 0 otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_metric: Option<String>,

    /// Extra Trend metric that also receives this step's latency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_metric: Option<String>,

    /// Extra Counter metric incremented each time the step succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_metric: Option<String>,
}

/// Request template; `url`, header values and `body` are Handlebars templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// A string is used as a raw template; any other value is serialised to
    /// JSON first and then rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,

    /// Per-request timeout overriding `http.timeout`
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

/// Named boolean predicate over a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,

    #[serde(flatten)]
    pub condition: CheckCondition,
}

/// Supported check predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCondition {
    /// Status is one of the listed codes
    Status(Vec<u16>),
    /// Status lies in `min..=max`
    StatusRange { min: u16, max: u16 },
    /// Raw body contains the substring
    BodyContains(String),
    /// JSON body has a value at the path
    JsonPathExists(String),
    /// JSON value at the path equals `value`
    JsonEquals { path: String, value: JsonValue },
    /// JSON value at the path is a non-empty array (`""` is the root)
    JsonArrayNonEmpty(String),
}

/// One extraction path, or several tried in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionPaths {
    One(String),
    Ordered(Vec<String>),
}

impl ExtractionPaths {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            ExtractionPaths::One(path) => vec![path.as_str()],
            ExtractionPaths::Ordered(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// Post-step pause
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelayConfig {
    Fixed(#[serde(with = "humantime_serde")] Duration),
    Jittered {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl Validatable for ScriptConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        if self.steps.is_empty() {
            return Err(self.validation_error(format!(
                "script '{}' must have at least one step",
                self.name
            )));
        }
        validate_unique_names(
            self.steps.iter().map(|s| s.name.as_str()),
            "step name",
            self.domain_name(),
        )?;
        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "script"
    }
}

impl Validatable for StepConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        self.request.validate()?;
        validate_positive(self.every, "every", self.domain_name())?;

        for name in self.set.keys() {
            validate_variable_name(name, "set", self.domain_name())?;
        }

        for check in &self.checks {
            check.validate()?;
        }

        for (name, paths) in &self.extract {
            validate_required_string(name, "extract name", self.domain_name())?;
            let paths = paths.paths();
            if paths.is_empty() {
                return Err(self.validation_error(format!(
                    "step '{}' extraction '{}' has no paths",
                    self.name, name
                )));
            }
            if paths.iter().any(|p| p.trim().is_empty() && !p.is_empty()) {
                return Err(self.validation_error(format!(
                    "step '{}' extraction '{}' has a blank path",
                    self.name, name
                )));
            }
        }

        if let Some(DelayConfig::Jittered { min, max }) = self.delay {
            if min > max {
                return Err(self.validation_error(format!(
                    "step '{}' delay min exceeds max",
                    self.name
                )));
            }
        }

        if let Some(ref metric) = self.error_metric {
            validate_required_string(metric, "error_metric", self.domain_name())?;
        }
        if let Some(ref metric) = self.trend_metric {
            validate_required_string(metric, "trend_metric", self.domain_name())?;
        }
        if let Some(ref metric) = self.counter_metric {
            validate_required_string(metric, "counter_metric", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "script.step"
    }
}

impl Validatable for RequestConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.url, "url", self.domain_name())?;
        validate_enum_choice(&self.method, &METHODS, "method", self.domain_name())?;
        if let Some(timeout) = self.timeout {
            validate_positive(timeout.as_millis(), "timeout", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "script.step.request"
    }
}

impl Validatable for CheckConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        match &self.condition {
            CheckCondition::Status(codes) if codes.is_empty() => Err(self.validation_error(
                format!("check '{}' lists no status codes", self.name),
            )),
            CheckCondition::StatusRange { min, max } if min > max => Err(self.validation_error(
                format!("check '{}' status range is empty", self.name),
            )),
            _ => Ok(()),
        }
    }

    fn domain_name(&self) -> &'static str {
        "script.step.check"
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_every() -> u64 {
    1
}
