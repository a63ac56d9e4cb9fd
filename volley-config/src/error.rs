//! Errors raised while loading or validating a configuration

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Every variant is fatal: a run never starts from a configuration that
/// produced one
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// An environment override or `${NAME}` reference could not be applied
    #[error("environment: {0}")]
    Env(String),

    #[error("{domain}: {message}")]
    Domain { domain: String, message: String },
}
