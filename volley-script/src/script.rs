//! The transaction script abstraction

use std::sync::Arc;
use volley_http::HttpClient;
use volley_metrics::{MetricKind, MetricSink};
use volley_resilience::StopSignal;

/// Everything one transaction instance needs from its surroundings
pub struct TransactionEnv {
    pub scenario: Arc<str>,
    /// Scenario-wide iteration number, starting at 0
    pub iteration: u64,
    /// Worker (open model) or virtual user (closed model) index
    pub vu: usize,
    pub client: Arc<dyn HttpClient>,
    pub sink: Arc<MetricSink>,
    pub stop: StopSignal,
}

/// What happened during one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Steps that sent a request, whether or not a response arrived
    pub issued: usize,
    /// Steps skipped because a template reference could not be resolved
    pub missing_references: usize,
    /// Steps whose request could not be built: a template failed to render
    /// or the client rejected the rendered request before sending it
    pub unsent: usize,
    /// Steps whose request produced no response
    pub transport_errors: usize,
    /// Steps where any check failed or the status was 4xx/5xx
    pub failed_steps: usize,
    /// The run asked this transaction to stop before its last step
    pub abandoned: bool,
}

impl TransactionOutcome {
    /// Every step due on this iteration issued a request
    pub fn is_success(&self) -> bool {
        self.missing_references == 0 && self.unsent == 0 && !self.abandoned
    }
}

/// One logical user journey, run once per arrival or VU loop
#[async_trait::async_trait]
pub trait TransactionScript: Send + Sync {
    fn name(&self) -> &str;

    /// Metrics this script emits besides the built-ins
    fn metrics(&self) -> Vec<(String, MetricKind)>;

    /// Run the steps in order, recording observations into `env.sink`
    async fn run(&self, env: &mut TransactionEnv) -> TransactionOutcome;
}
