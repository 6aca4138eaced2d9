//! Centralized error type for the resilience core.
//!
//! Every outbound call made through a [`crate::Retrier`] or a
//! [`crate::CircuitBreaker`] surfaces a [`PlatformError`]. The variants keep
//! the identity of the last real failure so callers can map it to a
//! transport-level response.

use thiserror::Error;
use tonic::Code;

use crate::circuit_breaker::CircuitState;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// gRPC error returned by a backend service
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// Circuit breaker refused the call before it was attempted
    #[error("Circuit breaker {state} for {service}")]
    CircuitOpen {
        /// The service name that has an open circuit
        service: String,
        /// State the breaker was in when it refused the call
        state: CircuitState,
    },

    /// Every attempt failed with a retryable error
    #[error("max retries ({max_retries}) exceeded, last error: {last}")]
    RetriesExhausted {
        /// Configured retry budget
        max_retries: u32,
        /// Failure of the final attempt
        #[source]
        last: Box<PlatformError>,
    },

    /// Caller cancelled the operation or its deadline expired
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport-level failure (dial, connection reset, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limited")]
    RateLimited,

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Application-level validation rejected the request
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error without a recognizable status
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlatformError {
    /// Create a circuit open error for the given service.
    #[must_use]
    pub fn circuit_open(service: impl Into<String>, state: CircuitState) -> Self {
        Self::CircuitOpen {
            service: service.into(),
            state,
        }
    }

    /// Create an unavailable error with the given message.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a transport error with the given message.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Returns `true` if the breaker refused the call, looking through a
    /// retries-exhausted wrapper.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.last_cause(), Self::CircuitOpen { .. })
    }

    /// Returns `true` if the caller cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The last real failure behind this error.
    ///
    /// For [`PlatformError::RetriesExhausted`] this is the error of the final
    /// attempt; every other variant is its own cause.
    #[must_use]
    pub fn last_cause(&self) -> &Self {
        match self {
            Self::RetriesExhausted { last, .. } => last.last_cause(),
            other => other,
        }
    }

    /// gRPC status code equivalent of this error.
    ///
    /// Errors with no recognizable status map to [`Code::Unknown`].
    #[must_use]
    pub fn code(&self) -> Code {
        match self.last_cause() {
            Self::Grpc(status) => status.code(),
            Self::CircuitOpen { .. } | Self::Unavailable(_) | Self::Transport(_) => {
                Code::Unavailable
            }
            Self::Cancelled => Code::Cancelled,
            Self::NotFound(_) => Code::NotFound,
            Self::RateLimited => Code::ResourceExhausted,
            Self::InvalidInput(_) | Self::Validation(_) => Code::InvalidArgument,
            Self::Timeout(_) => Code::DeadlineExceeded,
            Self::Internal(_) => Code::Internal,
            Self::Other(_) | Self::RetriesExhausted { .. } => Code::Unknown,
        }
    }
}
