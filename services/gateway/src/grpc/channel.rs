//! Backend channels and how they are established.
//!
//! tonic channels reconnect on their own but do not report connectivity, so
//! [`GrpcChannel`] tracks a [`ConnectivityState`] from the connect result,
//! the outcome of every call, and close.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_common::PlatformError;
use serde::Serialize;
use tonic::Code;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::config::ServiceConfig;

/// Interval between HTTP/2 keepalive pings.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
/// Time to wait for a keepalive ack before the connection is considered dead.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connectivity of a backend channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    /// Connected but unused
    Idle,
    /// Connection in progress
    Connecting,
    /// Last exchange with the backend succeeded
    Ready,
    /// Last exchange failed at the transport level
    TransientFailure,
    /// Channel closed
    Shutdown,
}

impl ConnectivityState {
    /// Upper-case name, as reported in health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Ready => 2,
            Self::TransientFailure => 3,
            Self::Shutdown => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::TransientFailure,
            _ => Self::Shutdown,
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free connectivity cell.
#[derive(Debug, Clone)]
pub struct ConnectivityCell(Arc<AtomicU8>);

impl ConnectivityCell {
    /// Create a cell in the given state.
    #[must_use]
    pub fn new(state: ConnectivityState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `state` unless the channel is already shut down.
    pub fn set(&self, state: ConnectivityState) {
        let shutdown = ConnectivityState::Shutdown.to_u8();
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != shutdown).then_some(state.to_u8())
            });
    }

    /// Update from a call outcome.
    ///
    /// Transport failures mark the channel as failing; any answer from the
    /// backend, including an application error, marks it ready.
    pub fn observe(&self, error: Option<&PlatformError>) {
        let next = match error.map(PlatformError::last_cause) {
            None => ConnectivityState::Ready,
            Some(PlatformError::Transport(_) | PlatformError::Unavailable(_)) => {
                ConnectivityState::TransientFailure
            }
            Some(PlatformError::Grpc(status)) if status.code() == Code::Unavailable => {
                ConnectivityState::TransientFailure
            }
            Some(PlatformError::CircuitOpen { .. } | PlatformError::Cancelled) => return,
            Some(_) => ConnectivityState::Ready,
        };
        self.set(next);
    }

    /// Mark the channel closed; returns `false` if it already was.
    pub fn shutdown(&self) -> bool {
        self.0.swap(ConnectivityState::Shutdown.to_u8(), Ordering::AcqRel)
            != ConnectivityState::Shutdown.to_u8()
    }
}

/// A connected channel owned by one backend service.
pub trait ChannelHandle: Clone + Send + Sync + 'static {
    /// Current connectivity, read from channel metadata.
    fn connectivity(&self) -> ConnectivityState;

    /// Record the outcome of a call made over this channel.
    fn observe(&self, error: Option<&PlatformError>);

    /// Close the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel could not be closed, including when it
    /// was already closed.
    fn close(&self) -> Result<(), PlatformError>;
}

/// Establishes channels to backend services.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Channel type produced by this connector.
    type Channel: ChannelHandle;

    /// Connect to `service` within its connect timeout.
    async fn connect(&self, service: &ServiceConfig) -> Result<Self::Channel, PlatformError>;
}

/// tonic channel with tracked connectivity.
#[derive(Debug, Clone)]
pub struct GrpcChannel {
    channel: Channel,
    state: ConnectivityCell,
}

impl GrpcChannel {
    /// Wrap a connected tonic channel.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: ConnectivityCell::new(ConnectivityState::Ready),
        }
    }

    /// The tonic channel, for building generated client stubs.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

impl ChannelHandle for GrpcChannel {
    fn connectivity(&self) -> ConnectivityState {
        self.state.get()
    }

    fn observe(&self, error: Option<&PlatformError>) {
        self.state.observe(error);
    }

    fn close(&self) -> Result<(), PlatformError> {
        // The transport shuts down once the last clone of the channel drops.
        if self.state.shutdown() {
            Ok(())
        } else {
            Err(PlatformError::transport("channel already closed"))
        }
    }
}

/// Connects to backends over HTTP/2 with keepalive pings.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcConnector;

#[async_trait]
impl Connector for GrpcConnector {
    type Channel = GrpcChannel;

    async fn connect(&self, service: &ServiceConfig) -> Result<GrpcChannel, PlatformError> {
        let endpoint = Endpoint::from_shared(service.address.to_string())
            .map_err(|e| PlatformError::transport(format!("invalid endpoint: {e}")))?
            .connect_timeout(service.connect_timeout)
            .tcp_keepalive(Some(KEEPALIVE_INTERVAL))
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        debug!(service = %service.name, target = %service.address, "Dialing backend");
        let channel = tokio::time::timeout(service.connect_timeout, endpoint.connect())
            .await
            .map_err(|_| {
                PlatformError::Timeout(format!(
                    "connection to {} did not become ready within {:?}",
                    service.address, service.connect_timeout
                ))
            })?
            .map_err(|e| PlatformError::transport(format!("failed to dial {}: {e}", service.address)))?;

        Ok(GrpcChannel::new(channel))
    }
}
