//! Structured logging infrastructure for volley
//!
//! Installs a global `tracing` subscriber driven by the `logging` section of
//! the run configuration. Records emitted through the `log` facade by the
//! configuration crate are bridged into the same subscriber.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
