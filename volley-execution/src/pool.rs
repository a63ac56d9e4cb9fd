//! Open-model execution pool
//!
//! Workers share one arrival queue. The pool keeps a ledger of idle workers
//! and unassigned arrivals so that [`OpenPool::offer`] can decide without
//! waiting: hand the arrival to an idle worker, start a new worker while
//! below `max`, queue it while the backlog has room, or drop it.

use crate::worker::WorkerContext;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use volley_metrics::{builtin, Observation};
use volley_resilience::StopSignal;

/// Pool bounds for one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers started before the first arrival
    pub pre_allocated: usize,
    /// Hard ceiling on workers
    pub max: usize,
    /// Arrivals allowed to wait when every worker is busy
    pub max_backlog: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pre_allocated: 1,
            max: 1,
            max_backlog: 0,
        }
    }
}

/// Outcome of offering an arrival to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// An idle worker will take it
    Idle,
    /// A new worker was started for it
    Spawned,
    /// Queued until a busy worker frees up
    Queued,
    /// No capacity left; counted in `dropped_iterations`
    Dropped,
}

/// Marker for one accepted arrival
#[derive(Debug)]
struct Arrival;

#[derive(Debug, Default)]
struct Ledger {
    /// Workers waiting on the queue with no arrival promised to them
    idle: usize,
    spawned: usize,
    /// Accepted arrivals no worker has claimed yet
    backlog: usize,
}

struct PoolShared {
    config: PoolConfig,
    context: WorkerContext,
    stop: StopSignal,
    ledger: Mutex<Ledger>,
    queue: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arrival>>,
    drop_warned: AtomicBool,
}

/// Lazily growing worker pool fed by the arrival scheduler
pub struct OpenPool {
    shared: Arc<PoolShared>,
    sender: Option<mpsc::UnboundedSender<Arrival>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl OpenPool {
    /// Create the pool and start `pre_allocated` workers
    pub fn start(config: PoolConfig, context: WorkerContext, stop: StopSignal) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pool = Self {
            shared: Arc::new(PoolShared {
                config,
                context,
                stop,
                ledger: Mutex::new(Ledger::default()),
                queue: tokio::sync::Mutex::new(receiver),
                drop_warned: AtomicBool::new(false),
            }),
            sender: Some(sender),
            workers: Mutex::new(Vec::new()),
        };

        let initial = config.pre_allocated.min(config.max);
        {
            let mut ledger = pool.shared.ledger.lock();
            ledger.idle = initial;
            ledger.spawned = initial;
        }
        for index in 0..initial {
            pool.spawn_worker(index);
        }
        pool.shared.context.stats.workers(initial);
        // A run with no drops still reports the counter as zero
        pool.shared
            .context
            .sink
            .record(Observation::counter(builtin::DROPPED_ITERATIONS, 0.0));

        info!(
            "Started pool for {} with {} workers (max {}, backlog {})",
            pool.shared.context.scenario, initial, config.max, config.max_backlog
        );
        pool
    }

    /// Admit or drop one arrival. Never waits.
    pub fn offer(&self) -> Admission {
        let shared = &self.shared;
        shared.context.stats.offered();

        let Some(ref sender) = self.sender else {
            return self.reject();
        };

        let (admission, new_worker) = {
            let mut ledger = shared.ledger.lock();
            if ledger.idle > 0 {
                ledger.idle -= 1;
                (Admission::Idle, None)
            } else if ledger.spawned < shared.config.max {
                ledger.spawned += 1;
                (Admission::Spawned, Some(ledger.spawned - 1))
            } else if ledger.backlog < shared.config.max_backlog {
                ledger.backlog += 1;
                (Admission::Queued, None)
            } else {
                drop(ledger);
                return self.reject();
            }
        };

        if let Some(index) = new_worker {
            debug!("Spawning worker {} for {}", index, shared.context.scenario);
            self.spawn_worker(index);
            shared.context.stats.workers(index + 1);
        }

        if sender.send(Arrival).is_err() {
            // Every worker is gone; nothing will ever run this arrival
            return self.reject();
        }
        admission
    }

    /// Stop accepting arrivals. Workers drain the queue, then exit.
    pub fn close(&mut self) {
        self.sender.take();
    }

    /// Wait for every worker to exit
    pub async fn join(mut self) {
        self.close();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(
                    "Worker task for {} ended abnormally: {}",
                    self.shared.context.scenario, e
                );
            }
        }
    }

    fn reject(&self) -> Admission {
        record_drop(&self.shared);
        Admission::Dropped
    }

    fn spawn_worker(&self, index: usize) {
        let shared = self.shared.clone();
        let handle = tokio::spawn(worker_loop(shared, index));
        self.workers.lock().push(handle);
    }
}

fn record_drop(shared: &PoolShared) {
    let dropped = shared.context.stats.dropped();
    shared
        .context
        .sink
        .record(Observation::counter(builtin::DROPPED_ITERATIONS, 1.0));
    if !shared.drop_warned.swap(true, Ordering::Relaxed) {
        warn!(
            "Scenario {} is dropping arrivals: all {} workers busy and backlog full",
            shared.context.scenario, shared.config.max
        );
    } else {
        debug!(
            "Dropped arrival for {} ({} so far)",
            shared.context.scenario, dropped
        );
    }
}

async fn worker_loop(shared: Arc<PoolShared>, index: usize) {
    loop {
        let arrival = {
            let mut queue = shared.queue.lock().await;
            queue.recv().await
        };
        let Some(Arrival) = arrival else {
            break;
        };

        if shared.stop.is_abandoned() {
            // Accepted but never started before the run gave up on it
            record_drop(&shared);
        } else {
            shared.context.run_transaction(index, &shared.stop).await;
        }

        let mut ledger = shared.ledger.lock();
        if ledger.backlog > 0 {
            ledger.backlog -= 1;
        } else {
            ledger.idle += 1;
        }
    }
    debug!("Worker {} of {} exiting", index, shared.context.scenario);
}
