//! Domain-driven configuration management for volley
//!
//! This crate provides modular configuration split by functional domains,
//! with validation, defaults, and environment variable support. A run is
//! described by one YAML document: run-wide limits, the HTTP client, logging,
//! the scenarios to execute and the thresholds that decide pass or fail.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, EnvLookup};

// Re-export domain configurations
pub use domains::{
    http::HttpConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    run::RunConfig,
    scenario::{ExecutorKind, ScenarioConfig, StageConfig},
    script::{
        CheckCondition, CheckConfig, DelayConfig, ExtractionPaths, RequestConfig, ScriptConfig,
        StepConfig,
    },
    threshold::ThresholdExprs,
    VolleyConfig,
};
