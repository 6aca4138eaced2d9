//! Resilient gRPC clients for the backend services.
//!
//! The [`ClientManager`] owns, per backend service, one channel, one circuit
//! breaker and one retrier, and hands out [`ServiceClient`] handles that run
//! every call through both.

pub mod channel;
pub mod client;
pub mod manager;
pub mod registry;

pub use channel::{
    ChannelHandle, ConnectivityCell, ConnectivityState, Connector, GrpcChannel, GrpcConnector,
};
pub use client::{ServiceClient, ServiceConnection};
pub use manager::{ClientManager, ServiceHealth};
pub use registry::{ServiceInfo, ServiceRegistry};
