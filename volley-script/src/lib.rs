//! Transaction scripts for volley
//!
//! A [`TransactionScript`] is one user journey: ordered steps, each a
//! templated request whose response is checked and mined for values that
//! later steps reference. [`StepScript`] builds one from configuration.
//! Values extracted during a transaction live in a [`CorrelationContext`]
//! owned by the worker running it and are discarded when it ends.

pub mod check;
pub mod context;
pub mod error;
pub mod extract;
pub mod script;
pub mod steps;
pub mod template;

pub use context::CorrelationContext;
pub use error::{TemplateError, TemplateResult};
pub use script::{TransactionEnv, TransactionOutcome, TransactionScript};
pub use steps::StepScript;
pub use template::{TemplateEngine, MISSING};
