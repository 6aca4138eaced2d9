//! Shared library for cross-cutting concerns in gateway-platform Rust services.
//!
//! This crate provides the resilience layer used for every outbound call from
//! the gateway to a backend service:
//! - Error types with retryability classification
//! - Exponential backoff with jitter
//! - Circuit breaker with generation-scoped counts and lazy transitions
//! - Retrier composing backoff, classification and the circuit breaker
//! - Structured logging setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod retry;
pub mod tracing_config;

pub use backoff::compute_delay;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Counts, Permit, StateTransition,
    TripPolicy, default_trip_policy,
};
pub use classifier::{ErrorClassifier, is_retryable_code};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::PlatformError;
pub use retry::{Retrier, RetryConfig, Sleeper, TokioSleeper};
pub use tracing_config::{LogFormat, TracingConfig, TracingError, init_tracing};
pub use tokio_util::sync::CancellationToken;
