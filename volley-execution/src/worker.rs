//! Running one transaction on behalf of a pool worker or virtual user

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use volley_config::ExecutorKind;
use volley_http::HttpClient;
use volley_metrics::{builtin, MetricSink, Observation};
use volley_resilience::StopSignal;
use volley_script::{TransactionEnv, TransactionScript};

/// Live counters for one scenario, shared by its scheduler and workers
#[derive(Debug, Default)]
pub struct ScenarioStats {
    offered: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    dropped: AtomicU64,
    worker_errors: AtomicU64,
    failed_transactions: AtomicU64,
    peak_workers: AtomicUsize,
}

impl ScenarioStats {
    pub fn offered(&self) {
        self.offered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn workers(&self, active: usize) {
        self.peak_workers.fetch_max(active, Ordering::Relaxed);
    }

    pub fn report(&self, name: &str, executor: ExecutorKind) -> ScenarioReport {
        ScenarioReport {
            name: name.to_string(),
            executor,
            offered: self.offered.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            worker_errors: self.worker_errors.load(Ordering::Relaxed),
            failed_transactions: self.failed_transactions.load(Ordering::Relaxed),
            peak_workers: self.peak_workers.load(Ordering::Relaxed),
        }
    }
}

/// Final counters for one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub executor: ExecutorKind,
    /// Arrivals the schedule produced (open model) or iterations begun (closed)
    pub offered: u64,
    pub started: u64,
    /// Transactions that ran every step due on their iteration
    pub completed: u64,
    /// Transactions cut short by a stop
    pub abandoned: u64,
    pub dropped: u64,
    pub worker_errors: u64,
    /// Transactions where a step could not be issued
    pub failed_transactions: u64,
    /// Most workers or VUs alive at once
    pub peak_workers: usize,
}

/// What a worker needs to run transactions for a scenario
#[derive(Clone)]
pub struct WorkerContext {
    pub scenario: Arc<str>,
    pub script: Arc<dyn TransactionScript>,
    pub client: Arc<dyn HttpClient>,
    pub sink: Arc<MetricSink>,
    pub stats: Arc<ScenarioStats>,
    iterations: Arc<AtomicU64>,
}

impl WorkerContext {
    pub fn new(
        scenario: &str,
        script: Arc<dyn TransactionScript>,
        client: Arc<dyn HttpClient>,
        sink: Arc<MetricSink>,
    ) -> Self {
        Self {
            scenario: Arc::from(scenario),
            script,
            client,
            sink,
            stats: Arc::new(ScenarioStats::default()),
            iterations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run one transaction to completion. Panics inside the script are
    /// caught and counted; the caller keeps serving.
    pub async fn run_transaction(&self, vu: usize, stop: &StopSignal) {
        let iteration = self.iterations.fetch_add(1, Ordering::Relaxed);
        self.stats.started.fetch_add(1, Ordering::Relaxed);

        let mut env = TransactionEnv {
            scenario: self.scenario.clone(),
            iteration,
            vu,
            client: self.client.clone(),
            sink: self.sink.clone(),
            stop: stop.clone(),
        };

        let started = Instant::now();
        let result = AssertUnwindSafe(self.script.run(&mut env))
            .catch_unwind()
            .await;

        match result {
            Ok(outcome) => {
                if outcome.abandoned {
                    debug!(
                        "Iteration {} of {} abandoned after {} steps",
                        iteration, self.scenario, outcome.issued
                    );
                    self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                if !outcome.is_success() {
                    self.stats
                        .failed_transactions
                        .fetch_add(1, Ordering::Relaxed);
                }
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                self.sink.record_all([
                    Observation::counter(builtin::ITERATIONS, 1.0),
                    Observation::trend(builtin::ITERATION_DURATION, started.elapsed()),
                ]);
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(
                    "Worker {} of {} faulted on iteration {}: {}",
                    vu, self.scenario, iteration, message
                );
                self.stats.worker_errors.fetch_add(1, Ordering::Relaxed);
                self.sink
                    .record(Observation::counter(builtin::WORKER_ERRORS, 1.0));
            }
        }
    }
}
