//! Run-wide limits

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Hard deadline for the whole run; in-flight transactions abandon
    /// their remaining steps when it fires
    #[serde(with = "humantime_serde", default = "default_run_timeout")]
    pub timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: default_run_timeout(),
        }
    }
}

impl Validatable for RunConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_millis(), "timeout", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "run"
    }
}

fn default_run_timeout() -> Duration {
    Duration::from_secs(3600)
}
