//! Circuit breaker implementation for resilience.
//!
//! One breaker guards one backend service. It tracks the outcomes of the
//! calls admitted in the current *generation* and moves between three states:
//!
//! - Closed: calls flow; the trip policy is consulted after every failure and
//!   the counts are reset whenever the rolling window elapses.
//! - Open: calls are refused until the open duration has elapsed.
//! - Half-Open: up to `max_half_open_probes` calls are admitted; enough
//!   successes close the circuit, the first failure opens it again.
//!
//! Open to Half-Open is computed lazily on access, there is no background
//! timer. Every transition starts a new generation, and outcomes reported with
//! a permit from an older generation are ignored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::PlatformError;
use crate::clock::{Clock, SystemClock};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, limited requests are allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call outcomes accumulated in the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Calls admitted
    pub requests: u64,
    /// Calls that reported success
    pub successes: u64,
    /// Calls that reported failure
    pub failures: u64,
    /// Calls admitted, including those still in flight
    pub total: u64,
}

impl Counts {
    /// Failures divided by total, zero when nothing was admitted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total as f64
    }
}

/// Decides when a closed breaker trips open.
pub type TripPolicy = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Trips once at least five calls were admitted and more than half failed.
#[must_use]
pub fn default_trip_policy(counts: &Counts) -> bool {
    counts.total >= 5 && counts.failure_ratio() > 0.5
}

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum calls admitted while half-open, and successes needed to close
    pub max_half_open_probes: u32,
    /// Time spent open before probing
    pub open_duration: Duration,
    /// Lifetime of the closed-state counts; zero keeps them until a transition
    pub rolling_window: Duration,
    /// Closed to Open decision
    pub trip_policy: TripPolicy,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("max_half_open_probes", &self.max_half_open_probes)
            .field("open_duration", &self.open_duration)
            .field("rolling_window", &self.rolling_window)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_half_open_probes: 10,
            open_duration: Duration::from_secs(60),
            rolling_window: Duration::from_secs(60),
            trip_policy: Arc::new(default_trip_policy),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with a custom half-open probe limit.
    #[must_use]
    pub fn with_max_half_open_probes(mut self, probes: u32) -> Self {
        self.max_half_open_probes = probes;
        self
    }

    /// Create a new config with a custom open duration.
    #[must_use]
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Create a new config with a custom rolling window.
    #[must_use]
    pub fn with_rolling_window(mut self, window: Duration) -> Self {
        self.rolling_window = window;
        self
    }

    /// Create a new config with a custom trip policy.
    #[must_use]
    pub fn with_trip_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.trip_policy = Arc::new(policy);
        self
    }
}

/// Admission token returned by [`CircuitBreaker::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a permit must be reported back with record_result or cancel"]
pub struct Permit {
    generation: u64,
}

impl Permit {
    /// Generation the call was admitted in.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Notification emitted on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Breaker name (the backend service)
    pub service: String,
    /// Previous state
    pub from: CircuitState,
    /// New state
    pub to: CircuitState,
    /// Generation started by this transition
    pub generation: u64,
    /// Wall-clock time of the transition
    pub at: DateTime<Utc>,
}

type Listener = Arc<dyn Fn(&StateTransition) + Send + Sync>;

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

impl Inner {
    /// Apply time-driven changes: window expiry while closed, cooldown expiry
    /// while open.
    fn refresh(&mut self, now: Instant, config: &CircuitBreakerConfig) -> Option<(CircuitState, CircuitState)> {
        let expired = self.expiry.is_some_and(|expiry| now >= expiry);
        match self.state {
            CircuitState::Closed if expired => {
                self.new_generation(now, config);
                None
            }
            CircuitState::Open if expired => self.set_state(CircuitState::HalfOpen, now, config),
            _ => None,
        }
    }

    fn set_state(
        &mut self,
        state: CircuitState,
        now: Instant,
        config: &CircuitBreakerConfig,
    ) -> Option<(CircuitState, CircuitState)> {
        if self.state == state {
            return None;
        }
        let previous = self.state;
        self.state = state;
        self.new_generation(now, config);
        Some((previous, state))
    }

    fn new_generation(&mut self, now: Instant, config: &CircuitBreakerConfig) {
        self.generation += 1;
        self.counts = Counts::default();
        self.expiry = match self.state {
            CircuitState::Closed if config.rolling_window.is_zero() => None,
            CircuitState::Closed => Some(now + config.rolling_window),
            CircuitState::Open | CircuitState::HalfOpen => Some(now + config.open_duration),
        };
    }
}

/// Releases an unreported permit when a guarded call is dropped or cancelled.
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<Permit>,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.cancel(permit);
        }
    }
}

/// Circuit breaker for protecting a backend service.
///
/// All mutation happens under one lock owned by this instance; the lock is
/// never held while a guarded call is awaited.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
    listeners: RwLock<Vec<Listener>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a circuit breaker driven by the given clock.
    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut inner = Inner {
            state: CircuitState::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
        };
        inner.new_generation(clock.now(), &config);

        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(inner),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Name of the guarded service.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was built with.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Register a listener notified on every state transition.
    ///
    /// Listeners run after the breaker lock is released.
    pub fn on_transition<F>(&self, listener: F)
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Ask permission for one call.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::CircuitOpen`] when the breaker is open, or
    /// half-open with every probe slot taken. A refused call consumes no slot.
    pub fn allow(&self) -> Result<Permit, PlatformError> {
        let now = self.clock.now();
        let (result, transition) = {
            let mut inner = self.inner.lock();
            let transition = inner.refresh(now, &self.config);
            let refused = match inner.state {
                CircuitState::Open => true,
                CircuitState::HalfOpen => {
                    inner.counts.requests >= u64::from(self.config.max_half_open_probes)
                }
                CircuitState::Closed => false,
            };
            let result = if refused {
                Err(PlatformError::circuit_open(&self.name, inner.state))
            } else {
                inner.counts.requests = inner.counts.requests.saturating_add(1);
                inner.counts.total = inner.counts.total.saturating_add(1);
                Ok(Permit {
                    generation: inner.generation,
                })
            };
            (result, transition.map(|t| (t, inner.generation)))
        };

        self.notify(transition);
        if result.is_err() {
            debug!(service = %self.name, "Circuit breaker refused call");
        }
        result
    }

    /// Report the outcome of a call admitted by [`CircuitBreaker::allow`].
    ///
    /// Reports carrying a permit from an older generation are ignored.
    pub fn record_result(&self, permit: Permit, success: bool) {
        let now = self.clock.now();
        let mut transitions = Vec::with_capacity(2);
        {
            let mut inner = self.inner.lock();
            if let Some(t) = inner.refresh(now, &self.config) {
                transitions.push((t, inner.generation));
            }
            if inner.generation != permit.generation {
                debug!(
                    service = %self.name,
                    permit_generation = permit.generation,
                    generation = inner.generation,
                    "Ignoring stale call outcome"
                );
            } else {
                let next = if success {
                    inner.counts.successes = inner.counts.successes.saturating_add(1);
                    let recovered = inner.state == CircuitState::HalfOpen
                        && inner.counts.successes >= u64::from(self.config.max_half_open_probes);
                    recovered.then_some(CircuitState::Closed)
                } else {
                    inner.counts.failures = inner.counts.failures.saturating_add(1);
                    match inner.state {
                        CircuitState::Closed if (self.config.trip_policy)(&inner.counts) => {
                            Some(CircuitState::Open)
                        }
                        CircuitState::HalfOpen => Some(CircuitState::Open),
                        _ => None,
                    }
                };
                if let Some(t) = next.and_then(|state| inner.set_state(state, now, &self.config)) {
                    transitions.push((t, inner.generation));
                }
            }
        }

        for transition in transitions {
            self.notify(Some(transition));
        }
    }

    /// Give back a permit whose outcome is unknown (the caller gave up).
    ///
    /// The admission is removed from the current counts, which frees the
    /// half-open probe slot it occupied. Stale permits are ignored.
    pub fn cancel(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        if inner.generation == permit.generation {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
            inner.counts.total = inner.counts.total.saturating_sub(1);
        }
    }

    /// Run `operation` under breaker protection.
    ///
    /// Cancelling `cancel` while the operation is pending, or dropping the
    /// returned future, releases the permit; the former returns
    /// [`PlatformError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns the refusal from [`CircuitBreaker::allow`], the cancellation,
    /// or the operation's own error.
    pub async fn call<T, Fut>(&self, cancel: &CancellationToken, operation: Fut) -> Result<T, PlatformError>
    where
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let mut guard = PermitGuard {
            breaker: self,
            permit: Some(self.allow()?),
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PlatformError::Cancelled),
            result = operation => {
                if let Some(permit) = guard.permit.take() {
                    self.record_result(permit, result.is_ok());
                }
                result
            }
        }
    }

    /// Get the current circuit state, applying any pending lazy transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let (state, transition) = self.refreshed(|inner| inner.state);
        self.notify(transition);
        state
    }

    /// Get a copy of the current generation's counts.
    #[must_use]
    pub fn counts(&self) -> Counts {
        let (counts, transition) = self.refreshed(|inner| inner.counts);
        self.notify(transition);
        counts
    }

    /// Get the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        let (generation, transition) = self.refreshed(|inner| inner.generation);
        self.notify(transition);
        generation
    }

    fn refreshed<R>(
        &self,
        read: impl FnOnce(&Inner) -> R,
    ) -> (R, Option<((CircuitState, CircuitState), u64)>) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let transition = inner.refresh(now, &self.config);
        (read(&inner), transition.map(|t| (t, inner.generation)))
    }

    fn notify(&self, transition: Option<((CircuitState, CircuitState), u64)>) {
        let Some(((from, to), generation)) = transition else {
            return;
        };

        if to == CircuitState::Open {
            warn!(service = %self.name, %from, %to, generation, "Circuit breaker state changed");
        } else {
            info!(service = %self.name, %from, %to, generation, "Circuit breaker state changed");
        }

        let event = StateTransition {
            service: self.name.clone(),
            from,
            to,
            generation,
            at: Utc::now(),
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }
}
