//! HTTP client functionality for volley
//!
//! Workers talk to the system under test through the [`HttpClient`] trait.
//! [`HttpManager`] is the production implementation: one `reqwest` client,
//! built once from [`volley_config::HttpConfig`] and shared by every worker
//! so connections are pooled across transactions.

pub mod client;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use client::{HttpClient, HttpManager};
pub use errors::{HttpError, HttpResult};
pub use types::{HttpMethod, HttpMethodError, HttpRequest, HttpResponse};
