//! Configuration loading and environment variable handling

use crate::domains::utils::expand_env_references;
use crate::domains::VolleyConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Source of environment-style values
pub trait EnvLookup: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
    lookup: Arc<dyn EnvLookup>,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self::with_prefix("VOLLEY")
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Arc::new(ProcessEnv),
        }
    }

    /// Replace the environment source (overrides and `${NAME}` references)
    pub fn with_lookup(mut self, lookup: impl EnvLookup + 'static) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<VolleyConfig> {
        let content = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<VolleyConfig> {
        let mut config: VolleyConfig = serde_yaml::from_str(content)?;

        self.apply_env_overrides(&mut config)?;
        self.resolve_env_references(&mut config)?;

        config.validate_all()?;

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut VolleyConfig) -> ConfigResult<()> {
        self.apply_run_overrides(&mut config.run)?;
        self.apply_http_overrides(&mut config.http)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply run config overrides
    fn apply_run_overrides(&self, config: &mut crate::domains::run::RunConfig) -> ConfigResult<()> {
        if let Some(timeout) = self.get_env_var("RUN_TIMEOUT") {
            config.timeout = parse_duration("RUN_TIMEOUT", &timeout)?;
        }
        Ok(())
    }

    /// Apply HTTP config overrides
    fn apply_http_overrides(
        &self,
        config: &mut crate::domains::http::HttpConfig,
    ) -> ConfigResult<()> {
        if let Some(timeout) = self.get_env_var("HTTP_TIMEOUT") {
            config.timeout = parse_duration("HTTP_TIMEOUT", &timeout)?;
        }

        if let Some(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Some(verify_ssl) = self.get_env_var("HTTP_VERIFY_SSL") {
            config.verify_ssl = verify_ssl
                .parse()
                .map_err(|e| ConfigError::Env(format!("Invalid HTTP_VERIFY_SSL: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Some(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::Env(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Some(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::Env(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Resolve `${NAME:-default}` references in scenario base URLs and vars
    fn resolve_env_references(&self, config: &mut VolleyConfig) -> ConfigResult<()> {
        for scenario in &mut config.scenarios {
            if let Some(ref base_url) = scenario.base_url {
                let resolved = expand_env_references(base_url, |name| self.lookup.get(name))
                    .map_err(|name| {
                        ConfigError::Env(format!(
                            "scenario '{}' base_url references unset variable {}",
                            scenario.name, name
                        ))
                    })?;
                scenario.base_url = Some(resolved.trim_end_matches('/').to_string());
            }

            for (var, value) in scenario.vars.iter_mut() {
                *value = expand_env_references(value, |name| self.lookup.get(name)).map_err(
                    |name| {
                        ConfigError::Env(format!(
                            "scenario '{}' var {} references unset variable {}",
                            scenario.name, var, name
                        ))
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Option<String> {
        self.lookup.get(&format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_duration(name: &str, value: &str) -> ConfigResult<std::time::Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::Env(format!("Invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    const MINIMAL: &str = r#"
scenarios:
  - name: smoke
    executor: constant-arrival-rate
    duration: 30s
    target: 5
    pre_allocated: 2
    max: 5
    base_url: "${PRODUCTS_URL:-http://localhost:8001/}"
    script:
      name: smoke
      steps:
        - name: list_products
          request: { url: "{{base_url}}/products" }
"#;

    fn lookup_from(vars: &[(&str, &str)]) -> impl EnvLookup + 'static {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_base_url_default_applied() {
        let loader = ConfigLoader::new().with_lookup(lookup_from(&[]));
        let config = loader.from_yaml(MINIMAL).unwrap();
        assert_eq!(
            config.scenarios[0].base_url.as_deref(),
            Some("http://localhost:8001")
        );
    }

    #[test]
    fn test_base_url_env_override() {
        let loader =
            ConfigLoader::new().with_lookup(lookup_from(&[("PRODUCTS_URL", "http://products:8001")]));
        let config = loader.from_yaml(MINIMAL).unwrap();
        assert_eq!(
            config.scenarios[0].base_url.as_deref(),
            Some("http://products:8001")
        );
    }

    #[test]
    fn test_prefixed_overrides() {
        let loader = ConfigLoader::new().with_lookup(lookup_from(&[
            ("VOLLEY_HTTP_TIMEOUT", "5s"),
            ("VOLLEY_RUN_TIMEOUT", "2m"),
            ("VOLLEY_LOG_LEVEL", "debug"),
            ("VOLLEY_HTTP_VERIFY_SSL", "false"),
        ]));
        let config = loader.from_yaml(MINIMAL).unwrap();
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.run.timeout, Duration::from_secs(120));
        assert_eq!(
            config.logging.level,
            crate::domains::logging::LogLevel::Debug
        );
        assert!(!config.http.verify_ssl);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let loader =
            ConfigLoader::new().with_lookup(lookup_from(&[("VOLLEY_HTTP_TIMEOUT", "soon")]));
        assert!(matches!(
            loader.from_yaml(MINIMAL),
            Err(ConfigError::Env(_))
        ));
    }

    #[test]
    fn test_unset_reference_without_default() {
        let yaml = MINIMAL.replace("${PRODUCTS_URL:-http://localhost:8001/}", "${PRODUCTS_URL}");
        let loader = ConfigLoader::new().with_lookup(lookup_from(&[]));
        let err = loader.from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("PRODUCTS_URL"));
    }

    #[test]
    fn test_scenario_vars_resolved() {
        let yaml = MINIMAL.replace(
            "    script:",
            "    vars:\n      orders_url: \"${ORDERS_URL:-http://localhost:8003}\"\n      tenant: acme\n    script:",
        );
        let loader =
            ConfigLoader::new().with_lookup(lookup_from(&[("ORDERS_URL", "http://orders:8003")]));
        let config = loader.from_yaml(&yaml).unwrap();
        let vars = &config.scenarios[0].vars;
        assert_eq!(vars["orders_url"], "http://orders:8003");
        assert_eq!(vars["tenant"], "acme");

        let yaml = yaml.replace("${ORDERS_URL:-http://localhost:8003}", "${ORDERS_URL}");
        let err = ConfigLoader::new()
            .with_lookup(lookup_from(&[]))
            .from_yaml(&yaml)
            .unwrap_err();
        assert!(err.to_string().contains("orders_url"));
    }
}
