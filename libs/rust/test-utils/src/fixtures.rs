//! Test fixtures with sample data.

use std::time::Duration;

use rust_common::{CircuitBreakerConfig, RetryConfig};
use tonic::Status;

/// Backend services fronted by the gateway.
pub const GATEWAY_SERVICES: [&str; 4] = ["auth", "chat", "employee", "structure"];

/// Retry config with short, deterministic delays.
#[must_use]
pub fn fast_retry_config(max_retries: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(10))
        .without_jitter()
}

/// Breaker config with a small probe budget and the default trip policy.
#[must_use]
pub fn test_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .with_max_half_open_probes(2)
        .with_open_duration(Duration::from_secs(30))
        .with_rolling_window(Duration::from_secs(60))
}

/// Statuses a backend returns under transient trouble.
#[must_use]
pub fn retryable_statuses() -> Vec<Status> {
    vec![
        Status::unavailable("connection refused"),
        Status::deadline_exceeded("deadline exceeded"),
        Status::resource_exhausted("too many requests"),
        Status::aborted("transaction aborted"),
        Status::internal("transient internal error"),
    ]
}

/// Statuses a backend returns when it rejects the request itself.
#[must_use]
pub fn terminal_statuses() -> Vec<Status> {
    vec![
        Status::invalid_argument("phone number is malformed"),
        Status::not_found("employee not found"),
        Status::permission_denied("not a chat participant"),
        Status::already_exists("chat already exists"),
    ]
}
