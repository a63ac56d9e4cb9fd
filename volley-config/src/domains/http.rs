//! Client settings shared by every request the run issues

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One client is built from this per run and shared by all workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request deadline unless a step sets `request.timeout`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Redirect hops followed before the response is returned as-is; 0 turns
    /// redirect following off
    pub redirects: u32,

    pub user_agent: String,

    /// Reject invalid TLS certificates
    pub verify_ssl: bool,

    /// Keep connections open between transactions. Off forces a fresh
    /// connection per request.
    pub connection_reuse: bool,

    pub pool: PoolConfig,
}

/// Keep-alive pool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,

    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// TCP/TLS connect deadline; never longer than `timeout`
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            redirects: 10,
            user_agent: format!("volley/{}", env!("CARGO_PKG_VERSION")),
            verify_ssl: true,
            connection_reuse: true,
            pool: PoolConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 64,
            idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpConfig {
    /// Idle connections kept per host, honouring `connection_reuse`
    pub fn idle_per_host(&self) -> usize {
        if self.connection_reuse {
            self.pool.max_idle_per_host
        } else {
            0
        }
    }

    /// Connect deadline clamped to the request deadline
    pub fn connect_timeout(&self) -> Duration {
        self.pool.connect_timeout.min(self.timeout)
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_millis(), "timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;
        self.pool.validate()
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

impl Validatable for PoolConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.connect_timeout.as_millis(),
            "connect_timeout",
            self.domain_name(),
        )?;
        validate_positive(
            self.idle_timeout.as_millis(),
            "idle_timeout",
            self.domain_name(),
        )
    }

    fn domain_name(&self) -> &'static str {
        "http.pool"
    }
}
