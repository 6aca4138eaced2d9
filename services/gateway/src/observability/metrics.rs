//! Circuit Breaker and Upstream Call Metrics
//!
//! Provides Prometheus metrics for breaker state changes, retries and the
//! outcome of every upstream call.

use prometheus::{CounterVec, Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use rust_common::{CircuitState, StateTransition};

const NAMESPACE: &str = "gateway";

/// Gateway metrics
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    /// State changes counter
    pub state_changes: CounterVec,
    /// Current state gauge (0=closed, 1=open, 2=half-open)
    pub current_state: GaugeVec,
    /// Retries performed after a failed attempt
    pub retry_attempts: IntCounterVec,
    /// Upstream calls by outcome
    pub upstream_calls: IntCounterVec,
}

impl GatewayMetrics {
    /// Creates new gateway metrics registered in `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let state_changes = CounterVec::new(
            Opts::new(
                "circuit_breaker_state_changes_total",
                "Total circuit breaker state changes",
            )
            .namespace(NAMESPACE),
            &["service", "from", "to"],
        )?;
        registry.register(Box::new(state_changes.clone()))?;

        let current_state = GaugeVec::new(
            Opts::new("circuit_breaker_state", "Current circuit breaker state").namespace(NAMESPACE),
            &["service"],
        )?;
        registry.register(Box::new(current_state.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retries of upstream calls").namespace(NAMESPACE),
            &["service"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let upstream_calls = IntCounterVec::new(
            Opts::new("upstream_calls_total", "Total upstream calls by outcome").namespace(NAMESPACE),
            &["service", "outcome"],
        )?;
        registry.register(Box::new(upstream_calls.clone()))?;

        Ok(Self {
            state_changes,
            current_state,
            retry_attempts,
            upstream_calls,
        })
    }

    /// Records a breaker transition
    pub fn record_transition(&self, transition: &StateTransition) {
        self.state_changes
            .with_label_values(&[
                transition.service.as_str(),
                transition.from.as_str(),
                transition.to.as_str(),
            ])
            .inc();
        self.set_state(&transition.service, transition.to);
    }

    /// Sets the state gauge of a service
    pub fn set_state(&self, service: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        };
        self.current_state.with_label_values(&[service]).set(value);
    }

    /// Records a finished upstream call and the retries it took
    pub fn record_call(&self, service: &str, outcome: &str, retries: u32) {
        self.upstream_calls
            .with_label_values(&[service, outcome])
            .inc();
        if retries > 0 {
            self.retry_attempts
                .with_label_values(&[service])
                .inc_by(u64::from(retries));
        }
    }
}

/// Render every metric in `registry` in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
