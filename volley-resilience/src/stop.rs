//! Cooperative stop coordination
//!
//! A run stops in escalating steps. `Graceful` tells schedulers to stop
//! issuing arrivals while in-flight transactions carry on. `Abandon` tells
//! workers to finish the step they are on and skip the rest of the
//! transaction. Nothing is ever preempted: holders of a [`StopSignal`] poll
//! it between steps and race it against pauses.

use log::{debug, info};
use std::time::Duration;
use tokio::sync::watch;

/// Stop urgency, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StopLevel {
    /// No stop requested
    Running,
    /// Stop starting new work, let current transactions complete
    Graceful,
    /// Finish the current step and abandon the rest of the transaction
    Abandon,
}

impl std::fmt::Display for StopLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopLevel::Running => write!(f, "running"),
            StopLevel::Graceful => write!(f, "graceful"),
            StopLevel::Abandon => write!(f, "abandon"),
        }
    }
}

/// Owner side of a stop channel
#[derive(Debug)]
pub struct StopCoordinator {
    name: String,
    sender: watch::Sender<StopLevel>,
}

impl StopCoordinator {
    /// Create a coordinator in the `Running` state
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(StopLevel::Running);
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Hand out a signal for a scheduler or worker
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Current level
    pub fn level(&self) -> StopLevel {
        *self.sender.borrow()
    }

    /// Raise the stop level. Levels never go down; returns whether the
    /// level changed.
    pub fn escalate(&self, level: StopLevel) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if level > *current {
                *current = level;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Stop escalated to {} for {}", level, self.name);
        } else {
            debug!("Stop level {} for {} already reached", level, self.name);
        }
        changed
    }

    /// Send `Graceful` now and `Abandon` once `grace` has elapsed
    pub async fn stop_with_grace(&self, grace: Duration) {
        self.escalate(StopLevel::Graceful);
        let mut signal = self.signal();
        if !signal.sleep(grace).await {
            return;
        }
        self.escalate(StopLevel::Abandon);
    }
}

/// Receiver side of a stop channel
#[derive(Debug, Clone)]
pub struct StopSignal {
    receiver: watch::Receiver<StopLevel>,
}

impl StopSignal {
    /// Current level
    pub fn level(&self) -> StopLevel {
        *self.receiver.borrow()
    }

    /// No new work should start
    pub fn is_stopping(&self) -> bool {
        self.level() >= StopLevel::Graceful
    }

    /// Remaining steps of the current transaction should be skipped
    pub fn is_abandoned(&self) -> bool {
        self.level() >= StopLevel::Abandon
    }

    /// Resolve once the level reaches at least `level`. Never resolves if
    /// the coordinator is dropped first.
    pub async fn reached(&mut self, level: StopLevel) {
        if self.receiver.wait_for(|current| *current >= level).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless the transaction is abandoned first.
    /// Returns `true` when the full pause elapsed.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_abandoned() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.reached(StopLevel::Abandon) => false,
        }
    }
}
