//! Shared proptest generators for resilience types.

use proptest::prelude::*;
use rust_common::{CircuitBreakerConfig, RetryConfig};
use std::time::Duration;
use tonic::Code;

/// Generate codes the classifier treats as transient.
pub fn retryable_code_strategy() -> impl Strategy<Value = Code> {
    prop_oneof![
        Just(Code::Unavailable),
        Just(Code::DeadlineExceeded),
        Just(Code::ResourceExhausted),
        Just(Code::Aborted),
        Just(Code::Internal),
    ]
}

/// Generate codes the classifier treats as terminal.
pub fn terminal_code_strategy() -> impl Strategy<Value = Code> {
    prop_oneof![
        Just(Code::InvalidArgument),
        Just(Code::NotFound),
        Just(Code::PermissionDenied),
        Just(Code::AlreadyExists),
        Just(Code::Unauthenticated),
        Just(Code::FailedPrecondition),
        Just(Code::OutOfRange),
        Just(Code::Unimplemented),
    ]
}

/// Generate retry configurations without jitter.
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (0u32..6, 1u64..200, 110u32..400, 0u64..10_000).prop_map(
        |(max_retries, initial_ms, multiplier_pct, extra_ms)| RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(initial_ms + extra_ms),
            backoff_multiplier: f64::from(multiplier_pct) / 100.0,
            jitter: false,
        },
    )
}

/// Generate breaker configurations using the default trip policy.
pub fn breaker_config_strategy() -> impl Strategy<Value = CircuitBreakerConfig> {
    (1u32..10, 1u64..120, 1u64..600).prop_map(|(probes, open_secs, window_secs)| {
        CircuitBreakerConfig::default()
            .with_max_half_open_probes(probes)
            .with_open_duration(Duration::from_secs(open_secs))
            .with_rolling_window(Duration::from_secs(window_secs))
    })
}

/// Generate a sequence of call outcomes (`true` = success).
pub fn outcome_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..max_len)
}

/// Generate backend service names.
pub fn service_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z-]{2,20}"
}
