//! Exponential backoff delay computation.

use std::time::Duration;

use rand::Rng;

use crate::retry::RetryConfig;

/// Upper bound of the jitter added on top of the computed delay.
const JITTER_FRACTION: f64 = 0.1;

/// Delay to wait after the failed attempt number `attempt` (zero based).
///
/// The delay is `min(max_delay, initial_delay * backoff_multiplier^attempt)`.
/// With jitter enabled a random value in `[0, 0.1 * delay]` is added on top,
/// saturating at [`Duration::MAX`]. The result is never negative.
#[must_use]
pub fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let delay = base_delay(attempt, config);
    if !config.jitter || delay.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
    delay.saturating_add(delay.mul_f64(jitter))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let factor = config.backoff_multiplier.powi(exponent);
    let nanos = (config.initial_delay.as_nanos() as f64 * factor).round();

    if !nanos.is_finite() || nanos >= config.max_delay.as_nanos() as f64 {
        return config.max_delay;
    }
    if nanos <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(nanos as u64)
}
