//! Resilience patterns for volley
//!
//! Stop coordination with escalating urgency, shared by the arrival
//! scheduler and every pool worker, and jitter for post-step pauses.

pub mod jitter;
pub mod stop;

// Re-export commonly used types
pub use jitter::jitter_between;
pub use stop::{StopCoordinator, StopLevel, StopSignal};
