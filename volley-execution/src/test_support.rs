//! Fakes shared by the unit tests of this crate

use crate::worker::WorkerContext;
use std::sync::Arc;
use std::time::Duration;
use volley_http::{HttpClient, HttpRequest, HttpResponse, HttpResult};
use volley_metrics::{MetricKind, MetricSink};
use volley_script::{TransactionEnv, TransactionOutcome, TransactionScript};

/// Answers every request with 200 and an empty JSON array
pub struct OkClient;

#[async_trait::async_trait]
impl HttpClient for OkClient {
    async fn send(&self, _request: HttpRequest) -> HttpResult<HttpResponse> {
        Ok(HttpResponse::new(200, "[]", Duration::from_millis(5)))
    }
}

pub fn ok_client() -> Arc<dyn HttpClient> {
    Arc::new(OkClient)
}

/// Script that issues nothing and just pauses, optionally panicking
pub struct SleepyScript {
    pause: Duration,
    panic_every: Option<u64>,
}

impl SleepyScript {
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            panic_every: None,
        }
    }

    /// Panic on iterations `n-1`, `2n-1`, ...
    pub fn panicking_every(mut self, n: u64) -> Self {
        self.panic_every = Some(n);
        self
    }
}

#[async_trait::async_trait]
impl TransactionScript for SleepyScript {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn metrics(&self) -> Vec<(String, MetricKind)> {
        Vec::new()
    }

    async fn run(&self, env: &mut TransactionEnv) -> TransactionOutcome {
        if let Some(n) = self.panic_every {
            if env.iteration % n == n - 1 {
                panic!("iteration {} blew up", env.iteration);
            }
        }
        let mut outcome = TransactionOutcome::default();
        if !env.stop.sleep(self.pause).await {
            outcome.abandoned = true;
        }
        outcome
    }
}

pub fn context(
    scenario: &str,
    script: Arc<dyn TransactionScript>,
    client: Arc<dyn HttpClient>,
    sink: Arc<MetricSink>,
) -> WorkerContext {
    WorkerContext::new(scenario, script, client, sink)
}
