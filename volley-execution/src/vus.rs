//! Closed-model virtual users
//!
//! Each VU is a lane that loops transaction after transaction. A controller
//! re-evaluates the desired VU count on a fixed tick and publishes it; lanes
//! whose index is at or above the count park after their current iteration
//! and resume if the count rises again.

use crate::arrival::VuPlan;
use crate::worker::WorkerContext;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use volley_resilience::{StopLevel, StopSignal};

/// How often the desired VU count is recomputed
pub const CONTROL_TICK: Duration = Duration::from_millis(100);

/// Ramp virtual users along `plan` until the schedule ends or a stop is
/// requested. Returns the lane handles, which finish once the stop signal
/// reaches `Graceful` and their current iteration completes.
pub async fn drive_vus(
    plan: &VuPlan,
    context: &WorkerContext,
    mut stop: StopSignal,
) -> Vec<JoinHandle<()>> {
    let start = Instant::now();
    let (desired_tx, desired_rx) = watch::channel(0usize);
    let mut lanes: Vec<JoinHandle<()>> = Vec::new();

    let mut ticker = interval(CONTROL_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Ramping virtual users for {} over {:?}",
        context.scenario,
        plan.duration()
    );

    loop {
        let elapsed = start.elapsed();
        if elapsed >= plan.duration() {
            break;
        }

        let desired = plan.vus_at(elapsed);
        desired_tx.send_if_modified(|current| {
            if *current != desired {
                debug!("{} target VUs: {} -> {}", context.scenario, current, desired);
                *current = desired;
                true
            } else {
                false
            }
        });

        while lanes.len() < desired {
            let lane = lanes.len();
            lanes.push(tokio::spawn(lane_loop(
                lane,
                context.clone(),
                desired_rx.clone(),
                stop.clone(),
            )));
            context.stats.workers(lanes.len());
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.reached(StopLevel::Graceful) => break,
        }
    }

    debug!(
        "VU controller for {} finished with {} lanes",
        context.scenario,
        lanes.len()
    );
    lanes
}

/// Wait for lanes returned by [`drive_vus`]
pub async fn join_lanes(scenario: &str, lanes: Vec<JoinHandle<()>>) {
    for lane in lanes {
        if let Err(e) = lane.await {
            warn!("VU lane for {} ended abnormally: {}", scenario, e);
        }
    }
}

async fn lane_loop(
    lane: usize,
    context: WorkerContext,
    mut desired: watch::Receiver<usize>,
    mut stop: StopSignal,
) {
    loop {
        if stop.is_stopping() {
            break;
        }

        if lane >= *desired.borrow_and_update() {
            tokio::select! {
                changed = desired.changed() => {
                    if changed.is_err() {
                        // Controller is gone; wait for the stop
                        stop.reached(StopLevel::Graceful).await;
                        break;
                    }
                }
                _ = stop.reached(StopLevel::Graceful) => break,
            }
            continue;
        }

        context.stats.offered();
        context.run_transaction(lane, &stop).await;
        // Let other lanes and the controller run between back-to-back iterations
        tokio::task::yield_now().await;
    }
    debug!("VU {} of {} exiting", lane, context.scenario);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, ok_client, SleepyScript};
    use std::sync::Arc;
    use volley_config::{ExecutorKind, StageConfig};
    use volley_metrics::{builtin, MetricSink};
    use volley_resilience::StopCoordinator;

    #[tokio::test(start_paused = true)]
    async fn test_constant_vus_loop_back_to_back() {
        let plan = VuPlan::new(3.0, &[StageConfig::new(Duration::from_secs(10), 3.0)], 3);
        let sink = Arc::new(MetricSink::new());
        let script = Arc::new(SleepyScript::new(Duration::from_secs(1)));
        let ctx = context("closed", script, ok_client(), sink.clone());
        let stop = StopCoordinator::new("closed");

        let lanes = drive_vus(&plan, &ctx, stop.signal()).await;
        assert_eq!(lanes.len(), 3);
        stop.escalate(StopLevel::Graceful);
        join_lanes("closed", lanes).await;

        let report = ctx.stats.report("closed", ExecutorKind::ClosedVuCount);
        // 3 lanes, 1s per iteration, 10s schedule
        assert!((30..=33).contains(&report.completed), "{}", report.completed);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.peak_workers, 3);
        assert_eq!(
            sink.snapshot(Duration::from_secs(10)).counter(builtin::ITERATIONS),
            report.completed as f64
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_grows_lanes_and_caps_at_max() {
        let plan = VuPlan::new(0.0, &[StageConfig::new(Duration::from_secs(4), 8.0)], 5);
        let sink = Arc::new(MetricSink::new());
        let script = Arc::new(SleepyScript::new(Duration::from_millis(200)));
        let ctx = context("ramp", script, ok_client(), sink);
        let stop = StopCoordinator::new("ramp");

        let lanes = drive_vus(&plan, &ctx, stop.signal()).await;
        assert_eq!(lanes.len(), 5);
        stop.escalate(StopLevel::Graceful);
        join_lanes("ramp", lanes).await;

        let report = ctx.stats.report("ramp", ExecutorKind::ClosedVuCount);
        assert_eq!(report.peak_workers, 5);
        assert!(report.completed > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lanes_park_when_target_falls() {
        let plan = VuPlan::new(
            4.0,
            &[
                StageConfig::new(Duration::from_secs(2), 4.0),
                StageConfig::new(Duration::from_secs(0), 1.0),
                StageConfig::new(Duration::from_secs(4), 1.0),
            ],
            4,
        );
        let sink = Arc::new(MetricSink::new());
        let script = Arc::new(SleepyScript::new(Duration::from_millis(500)));
        let ctx = context("shrink", script, ok_client(), sink);
        let stop = StopCoordinator::new("shrink");

        let lanes = drive_vus(&plan, &ctx, stop.signal()).await;
        stop.escalate(StopLevel::Graceful);
        join_lanes("shrink", lanes).await;

        let report = ctx.stats.report("shrink", ExecutorKind::ClosedVuCount);
        // 4 lanes for 2s then 1 lane for 4s, at 2 iterations per second
        assert!((24..=28).contains(&report.completed), "{}", report.completed);
    }
}
