//! Per-service resilient client.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rust_common::{CancellationToken, CircuitBreaker, CircuitState, PlatformError, Retrier};
use tracing::warn;
use url::Url;

use super::channel::{ChannelHandle, ConnectivityState};
use crate::error::GatewayError;
use crate::observability::GatewayMetrics;

/// Everything the manager owns for one backend service.
///
/// The breaker and retrier live as long as the manager; the channel is set
/// by a successful connect and taken exactly once on stop.
pub struct ServiceConnection<H> {
    pub(crate) name: String,
    pub(crate) target: Url,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) retrier: Retrier,
    pub(crate) channel: RwLock<Option<H>>,
}

impl<H: ChannelHandle> ServiceConnection<H> {
    pub(crate) fn new(name: String, target: Url, breaker: CircuitBreaker, retrier: Retrier) -> Self {
        Self {
            name,
            target,
            breaker: Arc::new(breaker),
            retrier,
            channel: RwLock::new(None),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend address.
    #[must_use]
    pub const fn target(&self) -> &Url {
        &self.target
    }

    /// The service's circuit breaker.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The service's retrier.
    #[must_use]
    pub const fn retrier(&self) -> &Retrier {
        &self.retrier
    }

    /// Connectivity of the channel, or `None` when not connected.
    #[must_use]
    pub fn connectivity(&self) -> Option<ConnectivityState> {
        self.channel.read().as_ref().map(ChannelHandle::connectivity)
    }
}

impl<H> std::fmt::Debug for ServiceConnection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConnection")
            .field("name", &self.name)
            .field("target", &self.target.as_str())
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

/// Handle for calling one backend service.
///
/// Every call goes through the service's retrier and circuit breaker.
/// Cloning is cheap; clones share the breaker and channel.
#[derive(Clone)]
pub struct ServiceClient<H> {
    service: String,
    channel: H,
    breaker: Arc<CircuitBreaker>,
    retrier: Retrier,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl<H: ChannelHandle> ServiceClient<H> {
    pub(crate) fn new(
        connection: &ServiceConnection<H>,
        channel: H,
        metrics: Option<Arc<GatewayMetrics>>,
    ) -> Self {
        Self {
            service: connection.name.clone(),
            channel,
            breaker: Arc::clone(&connection.breaker),
            retrier: connection.retrier.clone(),
            metrics,
        }
    }

    /// Service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &H {
        &self.channel
    }

    /// Current breaker state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `operation` with retries, each attempt guarded by the breaker.
    ///
    /// `operation` receives a clone of the channel per attempt, so it can
    /// build a generated stub and issue one request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Call`] wrapping the final failure: a breaker
    /// refusal, a cancellation, a non-retryable error or exhausted retries.
    pub async fn call<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(H) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<PlatformError>,
    {
        let attempts = AtomicU32::new(0);
        let result = self
            .retrier
            .execute_with_circuit_breaker(cancel, &self.breaker, || {
                let attempt = self.observed(operation(self.channel.clone()));
                let attempts = &attempts;
                async move {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    attempt.await
                }
            })
            .await;

        self.finish(result, attempts.load(Ordering::Relaxed))
    }

    /// Run `operation` once, guarded by the breaker only.
    ///
    /// For non-idempotent requests that must not be repeated.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Call`] wrapping the breaker refusal, the
    /// cancellation or the operation's error.
    pub async fn call_without_retry<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce(H) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<PlatformError>,
    {
        let attempt = self.observed(operation(self.channel.clone()));
        let result = self.breaker.call(cancel, attempt).await;
        self.finish(result, 1)
    }

    async fn observed<T, E, Fut>(&self, attempt: Fut) -> Result<T, PlatformError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<PlatformError>,
    {
        let result = attempt.await.map_err(Into::into);
        self.channel.observe(result.as_ref().err());
        result
    }

    fn finish<T>(&self, result: Result<T, PlatformError>, attempts: u32) -> Result<T, GatewayError> {
        if let Some(metrics) = &self.metrics {
            metrics.record_call(&self.service, outcome(&result), attempts.saturating_sub(1));
        }
        result.map_err(|source| {
            if !source.is_cancelled() {
                warn!(service = %self.service, attempts, error = %source, "Upstream call failed");
            }
            GatewayError::Call {
                service: self.service.clone(),
                source,
            }
        })
    }
}

impl<H> std::fmt::Debug for ServiceClient<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

fn outcome<T>(result: &Result<T, PlatformError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if e.is_circuit_open() => "circuit_open",
        Err(PlatformError::Cancelled) => "cancelled",
        Err(PlatformError::RetriesExhausted { .. }) => "retries_exhausted",
        Err(_) => "failure",
    }
}
