//! Observability Module
//!
//! Prometheus metrics fed by breaker transitions and upstream call outcomes.
//! Structured logging is set up through `rust_common::init_tracing`.

pub mod metrics;

pub use metrics::{GatewayMetrics, render};
