//! Connection/client manager.
//!
//! Owns one channel, circuit breaker and retrier per backend service. The
//! breakers and retriers are built once, in [`ClientManager::new`], and
//! survive for the manager's lifetime; channels are opened by
//! [`ClientManager::start`] and closed by [`ClientManager::stop`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use rust_common::{CancellationToken, CircuitBreaker, ErrorClassifier, PlatformError, Retrier, Sleeper};
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use super::channel::{ChannelHandle, ConnectivityState, Connector, GrpcConnector};
use super::client::{ServiceClient, ServiceConnection};
use crate::config::{Config, ServiceConfig};
use crate::error::GatewayError;
use crate::observability::GatewayMetrics;

/// Health of one backend service as reported by [`ClientManager::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHealth {
    /// Not checked yet
    Unknown,
    /// Channel is ready
    Healthy,
    /// Channel exists but is not ready
    Unhealthy(ConnectivityState),
    /// No channel (never connected, or stopped)
    Disconnected,
}

impl ServiceHealth {
    /// Returns `true` for [`ServiceHealth::Healthy`].
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    const fn from_connectivity(state: Option<ConnectivityState>) -> Self {
        match state {
            None => Self::Disconnected,
            Some(ConnectivityState::Ready) => Self::Healthy,
            Some(other) => Self::Unhealthy(other),
        }
    }
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy(state) => write!(f, "unhealthy: {state}"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

impl Serialize for ServiceHealth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Started,
    Stopped,
}

/// Manages the resilient channels to every backend service.
pub struct ClientManager<C: Connector = GrpcConnector> {
    connector: C,
    services: Vec<ServiceConfig>,
    connections: BTreeMap<String, ServiceConnection<C::Channel>>,
    lifecycle: Mutex<Lifecycle>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl ClientManager<GrpcConnector> {
    /// Create a manager that connects over gRPC.
    #[must_use]
    pub fn grpc(config: &Config) -> Self {
        Self::new(config, GrpcConnector)
    }
}

impl<C: Connector> ClientManager<C> {
    /// Create a manager for every service in `config`.
    ///
    /// Nothing is connected until [`ClientManager::start`].
    #[must_use]
    pub fn new(config: &Config, connector: C) -> Self {
        let classifier = ErrorClassifier::new(config.retry_unrecognized_errors);
        let connections = config
            .services
            .iter()
            .map(|service| {
                let breaker = CircuitBreaker::new(&service.name, service.circuit_breaker.clone());
                let retrier = Retrier::new(service.retry.clone()).with_classifier(classifier);
                let connection = ServiceConnection::new(
                    service.name.clone(),
                    service.address.clone(),
                    breaker,
                    retrier,
                );
                (service.name.clone(), connection)
            })
            .collect();

        Self {
            connector,
            services: config.services.clone(),
            connections,
            lifecycle: Mutex::new(Lifecycle::New),
            metrics: None,
        }
    }

    /// Report breaker transitions and call outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        for connection in self.connections.values() {
            let listener = Arc::clone(&metrics);
            connection
                .breaker
                .on_transition(move |transition| listener.record_transition(transition));
            metrics.set_state(&connection.name, connection.breaker.state());
        }
        self.metrics = Some(metrics);
        self
    }

    /// Replace the sleeper every retrier waits with.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        for connection in self.connections.values_mut() {
            connection.retrier = connection.retrier.clone().with_sleeper(Arc::clone(&sleeper));
        }
        self
    }

    /// Connect every service in parallel.
    ///
    /// A service that fails to connect is logged and skipped; the others stay
    /// connected and are not rolled back.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ManagerClosed`] after [`ClientManager::stop`].
    /// - [`GatewayError::AlreadyStarted`] on a second start.
    /// - [`GatewayError::Startup`] listing every service that failed.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), GatewayError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Stopped => return Err(GatewayError::ManagerClosed),
                Lifecycle::Started => return Err(GatewayError::AlreadyStarted),
                Lifecycle::New => *lifecycle = Lifecycle::Started,
            }
        }

        let attempts = self.services.iter().map(|service| async move {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(PlatformError::Cancelled),
                result = self.connector.connect(service) => result,
            };
            (service, result)
        });

        let mut failures = Vec::new();
        for (service, result) in join_all(attempts).await {
            match result {
                Ok(channel) => {
                    self.install(&service.name, channel);
                    info!(service = %service.name, target = %service.address, "Backend client connected");
                }
                Err(source) => {
                    warn!(
                        service = %service.name,
                        target = %service.address,
                        error = %source,
                        "Failed to initialize backend client"
                    );
                    failures.push(GatewayError::Connect {
                        service: service.name.clone(),
                        target: service.address.to_string(),
                        source,
                    });
                }
            }
        }

        if failures.is_empty() {
            info!("All backend client connections initialized successfully");
            Ok(())
        } else {
            Err(GatewayError::Startup { failures })
        }
    }

    /// Store a fresh channel, or close it at once if the manager stopped
    /// while it was connecting.
    fn install(&self, name: &str, channel: C::Channel) {
        let Some(connection) = self.connections.get(name) else {
            return;
        };
        let mut slot = connection.channel.write();
        if *self.lifecycle.lock() == Lifecycle::Stopped {
            drop(slot);
            if let Err(e) = channel.close() {
                warn!(service = %name, error = %e, "Failed to close late connection");
            }
            return;
        }
        *slot = Some(channel);
    }

    /// Client for a started service.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ManagerClosed`] after [`ClientManager::stop`].
    /// - [`GatewayError::UnknownService`] for an unconfigured name.
    /// - [`GatewayError::ServiceUnavailable`] when the service is not
    ///   connected. The manager never reconnects inline.
    pub fn get_client(&self, service: &str) -> Result<ServiceClient<C::Channel>, GatewayError> {
        if *self.lifecycle.lock() == Lifecycle::Stopped {
            return Err(GatewayError::ManagerClosed);
        }
        let connection = self
            .connections
            .get(service)
            .ok_or_else(|| GatewayError::UnknownService {
                service: service.to_string(),
            })?;
        let channel = connection
            .channel
            .read()
            .clone()
            .ok_or_else(|| GatewayError::ServiceUnavailable {
                service: service.to_string(),
            })?;
        Ok(ServiceClient::new(connection, channel, self.metrics.clone()))
    }

    /// Close every channel exactly once.
    ///
    /// Stopping twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Shutdown`] listing every channel that failed
    /// to close; the remaining channels are still closed.
    pub fn stop(&self) -> Result<(), GatewayError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return Ok(());
            }
            *lifecycle = Lifecycle::Stopped;
        }

        let failures: Vec<_> = self
            .connections
            .values()
            .filter_map(|connection| {
                let channel = connection.channel.write().take()?;
                channel.close().err().map(|source| {
                    warn!(service = %connection.name, error = %source, "Failed to close backend connection");
                    GatewayError::Close {
                        service: connection.name.clone(),
                        source,
                    }
                })
            })
            .collect();

        if failures.is_empty() {
            info!("All backend client connections closed successfully");
            Ok(())
        } else {
            Err(GatewayError::Shutdown { failures })
        }
    }

    /// Snapshot of every service's channel connectivity.
    ///
    /// Reads channel metadata only; no request is sent.
    #[must_use]
    pub fn health_check(&self) -> BTreeMap<String, ServiceHealth> {
        self.connections
            .iter()
            .map(|(name, connection)| {
                (name.clone(), ServiceHealth::from_connectivity(connection.connectivity()))
            })
            .collect()
    }

    /// Per-service state, for diagnostics.
    #[must_use]
    pub fn connection(&self, service: &str) -> Option<&ServiceConnection<C::Channel>> {
        self.connections.get(service)
    }

    /// The breaker guarding `service`.
    #[must_use]
    pub fn breaker(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.connections.get(service).map(|c| Arc::clone(&c.breaker))
    }

    /// Configured service names, in sorted order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// Configuration of every managed service.
    #[must_use]
    pub fn services(&self) -> &[ServiceConfig] {
        &self.services
    }
}

impl<C: Connector> fmt::Debug for ClientManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("lifecycle", &*self.lifecycle.lock())
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
