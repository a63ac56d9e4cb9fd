//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod run;
pub mod scenario;
pub mod script;
pub mod threshold;
pub mod utils;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_required_string, validate_unique_names, Validatable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main volley configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VolleyConfig {
    /// Run-wide limits
    #[serde(default)]
    pub run: run::RunConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: http::HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Scenarios executed concurrently during the run
    #[serde(default)]
    pub scenarios: Vec<scenario::ScenarioConfig>,

    /// Pass/fail criteria keyed by metric name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, threshold::ThresholdExprs>,
}

impl VolleyConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.run.validate()?;
        self.http.validate()?;
        self.logging.validate()?;

        if self.scenarios.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one scenario must be configured".to_string(),
            ));
        }
        validate_unique_names(
            self.scenarios.iter().map(|s| s.name.as_str()),
            "scenario name",
            "scenarios",
        )?;
        for scenario in &self.scenarios {
            scenario.validate()?;
        }

        for (metric, exprs) in &self.thresholds {
            validate_required_string(metric, "metric name", "thresholds")?;
            if exprs.expressions().is_empty() {
                return Err(ConfigError::Domain {
                    domain: "thresholds".to_string(),
                    message: format!("metric '{}' lists no threshold expressions", metric),
                });
            }
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        serde_yaml::from_str::<VolleyConfig>(SAMPLE)
            .and_then(|config| serde_yaml::to_string(&config))
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

const SAMPLE: &str = r#"
run:
  timeout: 15m
http:
  timeout: 30s
logging:
  level: info
scenarios:
  - name: browsers
    executor: open-arrival-rate
    start_target: 5
    pre_allocated: 10
    max: 50
    stages:
      - { duration: 1m, target: 20 }
      - { duration: 3m, target: 20 }
      - { duration: 1m, target: 0 }
    base_url: "${PRODUCTS_URL:-http://localhost:8001}"
    script:
      name: browse_products
      steps:
        - name: list_products
          request:
            method: GET
            url: "{{base_url}}/products"
          checks:
            - name: products loaded
              status: [200]
          delay: 1s
thresholds:
  http_req_duration: ["p(95)<2000"]
  http_req_failed: ["rate<0.1"]
"#;
