//! Scenario orchestration
//!
//! The orchestrator validates everything a run needs before sending any
//! traffic, then drives every scenario concurrently against one shared
//! metric sink, applies the run-wide timeout, and turns the frozen sink into
//! a [`RunResult`].

use crate::arrival::{ArrivalPlan, VuPlan};
use crate::error::{ExecutionError, ExecutionResult};
use crate::pool::{OpenPool, PoolConfig};
use crate::result::{RunResult, StopReason};
use crate::scheduler::drive_arrivals;
use crate::vus::{drive_vus, join_lanes};
use crate::worker::{ScenarioReport, WorkerContext};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use volley_config::{ExecutorKind, ScenarioConfig, ThresholdExprs, VolleyConfig};
use volley_http::HttpClient;
use volley_metrics::{builtin, evaluate, MetricRegistry, MetricSink, Observation, Threshold, Verdict};
use volley_resilience::{StopCoordinator, StopLevel};
use volley_script::{StepScript, TransactionScript};

/// A scenario paired with the script its workers run
#[derive(Clone)]
pub struct ScenarioPlan {
    pub config: ScenarioConfig,
    pub script: Arc<dyn TransactionScript>,
}

impl ScenarioPlan {
    pub fn new(config: ScenarioConfig, script: Arc<dyn TransactionScript>) -> Self {
        Self { config, script }
    }
}

/// Requests an early end to a run from outside it, e.g. on Ctrl-C
#[derive(Clone)]
pub struct StopHandle {
    coordinator: Arc<StopCoordinator>,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Tell every in-flight transaction to finish its current step and
    /// abandon the rest
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.coordinator.escalate(StopLevel::Abandon);
    }
}

/// Runs a validated set of scenarios
pub struct Orchestrator {
    scenarios: Vec<ScenarioPlan>,
    thresholds: Vec<Threshold>,
    run_timeout: Duration,
    client: Arc<dyn HttpClient>,
    run_stop: Arc<StopCoordinator>,
    stop_requested: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Build step scripts for every scenario and check every threshold.
    /// All problems are reported together.
    pub fn new(config: &VolleyConfig, client: Arc<dyn HttpClient>) -> ExecutionResult<Self> {
        let mut problems = Vec::new();
        if let Err(e) = config.validate_all() {
            problems.push(e.to_string());
        }

        let mut plans = Vec::with_capacity(config.scenarios.len());
        for scenario in &config.scenarios {
            let script = StepScript::build(&scenario.script, scenario.base_url.as_deref())
                .map(|script| script.with_vars(&scenario.vars));
            match script {
                Ok(script) => plans.push(ScenarioPlan::new(scenario.clone(), Arc::new(script))),
                Err(e) => problems.push(format!("scenario '{}': {}", scenario.name, e)),
            }
        }

        Self::assemble(plans, &config.thresholds, config.run.timeout, client, problems)
    }

    /// Run caller-supplied scripts
    pub fn from_plans(
        plans: Vec<ScenarioPlan>,
        thresholds: &BTreeMap<String, ThresholdExprs>,
        run_timeout: Duration,
        client: Arc<dyn HttpClient>,
    ) -> ExecutionResult<Self> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for plan in &plans {
            if !seen.insert(plan.config.name.as_str()) {
                problems.push(format!("duplicate scenario name '{}'", plan.config.name));
            }
        }
        Self::assemble(plans, thresholds, run_timeout, client, problems)
    }

    fn assemble(
        scenarios: Vec<ScenarioPlan>,
        thresholds: &BTreeMap<String, ThresholdExprs>,
        run_timeout: Duration,
        client: Arc<dyn HttpClient>,
        mut problems: Vec<String>,
    ) -> ExecutionResult<Self> {
        if scenarios.is_empty() && problems.is_empty() {
            problems.push("no scenarios to run".to_string());
        }

        let mut registry = MetricRegistry::with_builtins();
        for plan in &scenarios {
            for (name, kind) in plan.script.metrics() {
                if let Err(e) = registry.register(&name, kind) {
                    problems.push(format!("scenario '{}': {}", plan.config.name, e));
                }
            }
        }

        let mut parsed = Vec::new();
        for (metric, exprs) in thresholds {
            for expression in exprs.expressions() {
                let threshold = Threshold::parse(metric, expression)
                    .and_then(|t| t.check_against(&registry).map(|_| t));
                match threshold {
                    Ok(threshold) => parsed.push(threshold),
                    Err(e) => problems.push(e.to_string()),
                }
            }
        }

        if !problems.is_empty() {
            return Err(ExecutionError::InvalidPlan(problems));
        }

        Ok(Self {
            scenarios,
            thresholds: parsed,
            run_timeout,
            client,
            run_stop: Arc::new(StopCoordinator::new("run")),
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn scenarios(&self) -> &[ScenarioPlan] {
        &self.scenarios
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            coordinator: self.run_stop.clone(),
            requested: self.stop_requested.clone(),
        }
    }

    /// Drive every scenario to completion, the run timeout, or an explicit
    /// stop, then evaluate thresholds
    pub async fn run(self) -> RunResult {
        let sink = Arc::new(MetricSink::new());
        // Fault counters read zero on a clean run instead of unobserved
        sink.record_all([
            Observation::counter(builtin::DROPPED_ITERATIONS, 0.0),
            Observation::counter(builtin::WORKER_ERRORS, 0.0),
            Observation::counter(builtin::MISSING_REFERENCES, 0.0),
        ]);
        let started = Instant::now();
        info!(
            "Starting run with {} scenarios (timeout {:?})",
            self.scenarios.len(),
            self.run_timeout
        );

        let mut scenario_stops = Vec::with_capacity(self.scenarios.len());
        let mut tasks = Vec::with_capacity(self.scenarios.len());
        for plan in &self.scenarios {
            let coordinator = Arc::new(StopCoordinator::new(plan.config.name.clone()));
            scenario_stops.push(coordinator.clone());
            let context = WorkerContext::new(
                &plan.config.name,
                plan.script.clone(),
                self.client.clone(),
                sink.clone(),
            );
            tasks.push(tokio::spawn(run_scenario(
                plan.config.clone(),
                context,
                coordinator,
            )));
        }

        // Run-level abandon reaches every scenario
        let mut run_signal = self.run_stop.signal();
        let forward_to = scenario_stops.clone();
        let forwarder = tokio::spawn(async move {
            run_signal.reached(StopLevel::Abandon).await;
            for coordinator in forward_to {
                coordinator.escalate(StopLevel::Abandon);
            }
        });

        let all = futures::future::join_all(tasks);
        tokio::pin!(all);
        let mut timed_out = false;
        let joined = tokio::select! {
            joined = &mut all => joined,
            _ = tokio::time::sleep(self.run_timeout) => {
                warn!(
                    "Run timeout of {:?} reached; abandoning in-flight transactions",
                    self.run_timeout
                );
                timed_out = true;
                self.run_stop.escalate(StopLevel::Abandon);
                all.await
            }
        };
        forwarder.abort();

        let mut reports = Vec::with_capacity(joined.len());
        for result in joined {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Scenario task failed: {}", e),
            }
        }

        let stop_reason = if timed_out {
            StopReason::Timeout
        } else if self.stop_requested.load(Ordering::SeqCst) {
            StopReason::Interrupted
        } else {
            StopReason::Completed
        };

        let snapshot = sink.freeze(started.elapsed());
        if sink.rejected() > 0 {
            warn!(
                "{} observations were rejected by the metric sink",
                sink.rejected()
            );
        }

        let outcomes = evaluate(&self.thresholds, &snapshot);
        for outcome in &outcomes {
            match outcome.verdict {
                Verdict::Pass => info!("Threshold {} passed", outcome.threshold),
                Verdict::Fail => warn!(
                    "Threshold {} failed (observed {:?})",
                    outcome.threshold, outcome.observed
                ),
                Verdict::Indeterminate => warn!(
                    "Threshold {} is indeterminate: {} received no observations",
                    outcome.threshold, outcome.threshold.metric
                ),
            }
        }

        let result = RunResult::new(snapshot, outcomes, stop_reason, reports);
        info!(
            "Run {} after {:?}: {} iterations, {} errors, {} dropped, thresholds {}",
            result.stop_reason,
            result.duration,
            result.iterations,
            result.errors,
            result.dropped,
            if result.passed { "passed" } else { "failed" }
        );
        result
    }
}

async fn run_scenario(
    config: ScenarioConfig,
    context: WorkerContext,
    coordinator: Arc<StopCoordinator>,
) -> ScenarioReport {
    info!(
        "Starting scenario {} ({}, script {})",
        config.name,
        config.executor,
        context.script.name()
    );

    match config.executor {
        ExecutorKind::OpenArrivalRate => {
            let plan = ArrivalPlan::for_scenario(&config);
            let pool_config = PoolConfig {
                pre_allocated: config.pre_allocated,
                max: config.max_workers(),
                max_backlog: config.max_backlog,
            };
            let mut pool = OpenPool::start(pool_config, context.clone(), coordinator.signal());
            drive_arrivals(&config.name, &plan, &pool, coordinator.signal()).await;
            pool.close();

            let grace = spawn_grace(coordinator.clone(), config.graceful_stop);
            pool.join().await;
            grace.abort();
        }
        ExecutorKind::ClosedVuCount => {
            let plan = VuPlan::for_scenario(&config);
            let lanes = drive_vus(&plan, &context, coordinator.signal()).await;

            let grace = spawn_grace(coordinator.clone(), config.graceful_stop);
            join_lanes(&config.name, lanes).await;
            grace.abort();
        }
    }

    let report = context.stats.report(&config.name, config.executor);
    info!(
        "Scenario {} finished: {} started, {} completed, {} dropped, {} worker errors",
        report.name, report.started, report.completed, report.dropped, report.worker_errors
    );
    report
}

/// Stop issuing new work now, abandon in-flight work after `grace`
fn spawn_grace(
    coordinator: Arc<StopCoordinator>,
    grace: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { coordinator.stop_with_grace(grace).await })
}
