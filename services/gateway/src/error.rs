//! Error handling module with type-safe, non-exhaustive error types
//!
//! This module provides:
//! - Stage-tagged errors (connect, call, close) naming the backend service
//! - Batch errors for startup and shutdown that keep every failure
//! - Mapping to gRPC codes, HTTP statuses and a serializable error body

use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use serde::Serialize;
use thiserror::Error;
use tonic::{Code, Status};

use crate::config::ConfigError;

/// Non-exhaustive error enum for forward compatibility
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No backend service is configured under this name
    #[error("Unknown service: {service}")]
    UnknownService {
        /// Requested service name
        service: String,
    },

    /// The service is configured but its channel is not connected
    #[error("Service {service} is not connected")]
    ServiceUnavailable {
        /// Name of the unavailable service
        service: String,
    },

    /// The client manager has been stopped
    #[error("Client manager is closed")]
    ManagerClosed,

    /// The client manager was already started
    #[error("Client manager already started")]
    AlreadyStarted,

    /// Establishing the channel to a backend failed
    #[error("Failed to connect {service} at {target}: {source}")]
    Connect {
        /// Service name
        service: String,
        /// Backend address
        target: String,
        /// Underlying failure
        #[source]
        source: PlatformError,
    },

    /// Closing the channel to a backend failed
    #[error("Failed to close {service} connection: {source}")]
    Close {
        /// Service name
        service: String,
        /// Underlying failure
        #[source]
        source: PlatformError,
    },

    /// One or more services failed to connect during startup
    #[error("Failed to initialize some clients: {}", summarize(.failures))]
    Startup {
        /// Every per-service connect failure
        failures: Vec<GatewayError>,
    },

    /// One or more channels failed to close during shutdown
    #[error("Errors closing connections: {}", summarize(.failures))]
    Shutdown {
        /// Every per-service close failure
        failures: Vec<GatewayError>,
    },

    /// A call to a backend service failed
    #[error("Call to {service} failed: {source}")]
    Call {
        /// Service name
        service: String,
        /// Underlying failure
        #[source]
        source: PlatformError,
    },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn summarize(failures: &[GatewayError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error codes for gateway responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Breaker refused the call
    CircuitOpen,
    /// Transport-level failure reaching the backend
    ConnectionError,
    /// Backend not connected or manager closed
    ServiceUnavailable,
    /// No such backend service
    UnknownService,
    /// Caller gave up
    Cancelled,
    /// Gateway-side failure
    Internal,
    /// Backend answered with this status code
    Upstream(Code),
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_breaker_open",
            Self::ConnectionError => "connection_error",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UnknownService => "unknown_service",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal_error",
            Self::Upstream(code) => code_name(*code),
        }
    }

    /// Get the gRPC status code for this error
    #[must_use]
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::CircuitOpen | Self::ConnectionError | Self::ServiceUnavailable => {
                Code::Unavailable
            }
            Self::UnknownService => Code::NotFound,
            Self::Cancelled => Code::Cancelled,
            Self::Internal => Code::Internal,
            Self::Upstream(code) => *code,
        }
    }

    /// Get the HTTP status the gateway answers with
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::CircuitOpen | Self::ConnectionError | Self::ServiceUnavailable => 503,
            Self::UnknownService => 404,
            Self::Cancelled => 408,
            Self::Internal => 500,
            Self::Upstream(code) => http_status_for(*code),
        }
    }
}

/// HTTP status for a gRPC status code.
#[must_use]
pub const fn http_status_for(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::Cancelled | Code::DeadlineExceeded => 408,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => 400,
        Code::NotFound => 404,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::PermissionDenied => 403,
        Code::ResourceExhausted => 429,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::Unauthenticated => 401,
        Code::Unknown | Code::Internal | Code::DataLoss => 500,
    }
}

const fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Structured JSON error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
    /// Backend service involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// When the error was produced
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    code: ErrorCode,
}

impl ErrorResponse {
    /// Create a new error response from a [`GatewayError`]
    #[must_use]
    pub fn from_error(error: &GatewayError) -> Self {
        let code = error.code();
        let service = error.service().map(str::to_string);
        let message = match code {
            ErrorCode::CircuitOpen => "Service temporarily unavailable".to_string(),
            ErrorCode::ConnectionError => "Service connection failed".to_string(),
            ErrorCode::ServiceUnavailable => service.as_deref().map_or_else(
                || "Service is currently unavailable".to_string(),
                |s| format!("{s} service is currently unavailable"),
            ),
            ErrorCode::UnknownService => error.to_string(),
            ErrorCode::Cancelled => "Request cancelled".to_string(),
            // Never expose internal error details
            ErrorCode::Internal => "Internal error".to_string(),
            ErrorCode::Upstream(_) => error.upstream_message().unwrap_or_default(),
        };

        Self {
            error: code.as_str(),
            message,
            service,
            timestamp: Utc::now(),
            code,
        }
    }

    /// Error code of this response
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// HTTP status for this response
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.code.http_status()
    }

    /// Convert to gRPC Status
    #[must_use]
    pub fn to_status(&self) -> Status {
        Status::new(self.code.grpc_code(), self.message.clone())
    }
}

impl GatewayError {
    /// Get the error code for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownService { .. } => ErrorCode::UnknownService,
            Self::ServiceUnavailable { .. } | Self::ManagerClosed => ErrorCode::ServiceUnavailable,
            Self::Connect { .. } => ErrorCode::ConnectionError,
            Self::Call { source, .. } => call_error_code(source),
            Self::AlreadyStarted
            | Self::Close { .. }
            | Self::Startup { .. }
            | Self::Shutdown { .. }
            | Self::Config(_) => ErrorCode::Internal,
        }
    }

    /// Backend service this error concerns, if any
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::UnknownService { service }
            | Self::ServiceUnavailable { service }
            | Self::Connect { service, .. }
            | Self::Close { service, .. }
            | Self::Call { service, .. } => Some(service),
            _ => None,
        }
    }

    /// The resilience-layer failure behind a connect, call or close error
    #[must_use]
    pub const fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            Self::Connect { source, .. } | Self::Close { source, .. } | Self::Call { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Per-service failures of a batch error; empty for other errors
    #[must_use]
    pub fn failures(&self) -> &[Self] {
        match self {
            Self::Startup { failures } | Self::Shutdown { failures } => failures,
            _ => &[],
        }
    }

    /// Returns `true` if the breaker refused the call
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.platform_error()
            .is_some_and(PlatformError::is_circuit_open)
    }

    /// Convert to gRPC Status
    #[must_use]
    pub fn to_status(&self) -> Status {
        ErrorResponse::from_error(self).to_status()
    }

    fn upstream_message(&self) -> Option<String> {
        match self.platform_error()?.last_cause() {
            PlatformError::Grpc(status) => Some(status.message().to_string()),
            other => Some(other.to_string()),
        }
    }
}

fn call_error_code(source: &PlatformError) -> ErrorCode {
    if source.is_circuit_open() {
        return ErrorCode::CircuitOpen;
    }
    match source.last_cause() {
        PlatformError::Cancelled => ErrorCode::Cancelled,
        PlatformError::Transport(_) | PlatformError::Unavailable(_) => ErrorCode::ConnectionError,
        PlatformError::Grpc(status) if status.code() == Code::Unavailable => {
            ErrorCode::ConnectionError
        }
        PlatformError::Other(_) | PlatformError::Internal(_) => ErrorCode::Internal,
        other => ErrorCode::Upstream(other.code()),
    }
}
