//! Failures that leave a step without a response

use crate::types::HttpMethodError;

/// Only `NetworkError` can happen after a request left the process; every
/// other variant is a request that could not be built
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error(transparent)]
    InvalidMethod(#[from] HttpMethodError),

    #[error("rendered URL is not valid: {0}")]
    InvalidUrl(String),

    #[error("rendered header name '{0}' is not valid")]
    InvalidHeaderName(String),

    #[error("rendered value of header '{0}' is not valid")]
    InvalidHeaderValue(String),

    #[error("cannot build HTTP client: {0}")]
    ConfigError(String),
}

impl HttpError {
    /// Whether the failure was the request timing out
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::NetworkError(e) if e.is_timeout())
    }

    /// Whether the request left the process and no response arrived.
    /// `false` means it was rejected locally and never sent.
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::NetworkError(e) if !e.is_builder())
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
