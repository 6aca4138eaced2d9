//! Gateway Service - resilient fan-out to the messenger backend services.
//!
//! This crate provides the resilience layer between the gateway and its
//! backends: one gRPC channel, circuit breaker and retrier per service,
//! owned by a [`ClientManager`], plus configuration, health monitoring,
//! metrics and graceful shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod grpc;
pub mod observability;
pub mod shutdown;

pub use config::{Config, ConfigError, ServiceConfig};
pub use error::{ErrorCode, ErrorResponse, GatewayError};
pub use grpc::{
    ChannelHandle, ClientManager, ConnectivityState, Connector, GrpcChannel, GrpcConnector,
    ServiceClient, ServiceHealth, ServiceInfo, ServiceRegistry,
};
pub use observability::GatewayMetrics;
pub use shutdown::{
    ShutdownCoordinator, ShutdownReport, ShutdownSignal, run_until_shutdown, wait_for_signal,
};
