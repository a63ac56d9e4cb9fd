//! Error types for run execution

use thiserror::Error;

/// Errors that stop a run before any traffic is generated
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Every configuration problem found while preparing the run
    #[error("Invalid run plan: {}", .0.join("; "))]
    InvalidPlan(Vec<String>),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),
}

impl ExecutionError {
    /// Individual problems, one per line of a report
    pub fn problems(&self) -> Vec<String> {
        match self {
            ExecutionError::InvalidPlan(problems) => problems.clone(),
            other => vec![other.to_string()],
        }
    }
}

// Convert from config errors
impl From<volley_config::ConfigError> for ExecutionError {
    fn from(err: volley_config::ConfigError) -> Self {
        Self::ConfigurationError(err.to_string())
    }
}

// Convert from HTTP errors
impl From<volley_http::HttpError> for ExecutionError {
    fn from(err: volley_http::HttpError) -> Self {
        Self::HttpClientError(err.to_string())
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_plan_lists_every_problem() {
        let err = ExecutionError::InvalidPlan(vec![
            "threshold on unknown metric 'erors'".to_string(),
            "scenario 'orders': template error".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.contains("erors"));
        assert!(message.contains("template error"));
        assert_eq!(err.problems().len(), 2);
    }
}
