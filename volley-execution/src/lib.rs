//! Volley execution engine
//!
//! This crate turns validated scenarios into load: the arrival scheduler and
//! lazily growing worker pool of the open model, the virtual user lanes of
//! the closed model, and the orchestrator that runs every scenario against
//! one metric sink and produces a [`RunResult`].

pub mod arrival;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod result;
pub mod scheduler;
pub mod vus;
pub mod worker;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use arrival::{ArrivalPlan, RampSchedule, VuPlan};
pub use error::{ExecutionError, ExecutionResult};
pub use orchestrator::{Orchestrator, ScenarioPlan, StopHandle};
pub use pool::{Admission, OpenPool, PoolConfig};
pub use result::{RunResult, StopReason};
pub use scheduler::{drive_arrivals, SchedulerSummary};
pub use vus::{drive_vus, join_lanes};
pub use worker::{ScenarioReport, ScenarioStats, WorkerContext};
