//! # Middleware
//!
//! Hooks the [`Dispatcher`](crate::dispatcher::Dispatcher) runs around every
//! call, matched or not.
//!
//! - [`TracingMiddleware`] opens a `request` span and logs the outcome
//! - [`MetricsMiddleware`] counts calls per envelope code and tracks latency
//!
//! A middleware may answer a call itself by returning a response from
//! [`Middleware::before`]; the handler is then skipped, but every `after`
//! hook still runs.

mod core;
mod metrics;
mod tracing;

pub use core::Middleware;
pub use metrics::MetricsMiddleware;
pub use tracing::TracingMiddleware;
