//! Open-model arrival scheduler

use crate::arrival::ArrivalPlan;
use crate::pool::{Admission, OpenPool};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use volley_resilience::{StopLevel, StopSignal};

/// Counts from one pass over a schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub offered: u64,
    pub dropped: u64,
    /// The schedule was cut short by a stop
    pub interrupted: bool,
}

/// Offer each planned arrival to the pool at its due time. Arrival timing
/// depends only on the plan, never on how busy the pool is. Returns once
/// the schedule has fully elapsed or a stop is requested.
pub async fn drive_arrivals(
    scenario: &str,
    plan: &ArrivalPlan,
    pool: &OpenPool,
    mut stop: StopSignal,
) -> SchedulerSummary {
    let start = Instant::now();
    let mut summary = SchedulerSummary::default();
    info!(
        "Scheduling {} arrivals for {} over {:?}",
        plan.expected_total(),
        scenario,
        plan.duration()
    );

    for offset in plan.arrivals() {
        if stop.is_stopping() {
            summary.interrupted = true;
            break;
        }
        tokio::select! {
            _ = sleep_until(start + offset) => {}
            _ = stop.reached(StopLevel::Graceful) => {
                summary.interrupted = true;
                break;
            }
        }

        summary.offered += 1;
        if pool.offer() == Admission::Dropped {
            summary.dropped += 1;
        }
    }

    if !summary.interrupted {
        // Trailing time with no arrivals still belongs to the schedule
        tokio::select! {
            _ = sleep_until(start + plan.duration()) => {}
            _ = stop.reached(StopLevel::Graceful) => summary.interrupted = true,
        }
    }

    debug!(
        "Scheduler for {} finished: {} offered, {} dropped",
        scenario, summary.offered, summary.dropped
    );
    summary
}
