//! Retryable vs. terminal error classification.

use tonic::Code;

use crate::PlatformError;

/// Returns `true` for gRPC codes that indicate a transient condition.
#[must_use]
pub const fn is_retryable_code(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable
            | Code::DeadlineExceeded
            | Code::ResourceExhausted
            | Code::Aborted
            | Code::Internal
    )
}

/// Decides whether a failed attempt is worth retrying.
///
/// Errors that carry no recognizable status ([`PlatformError::Other`]) are
/// retried when `retry_unrecognized` is set, which is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassifier {
    retry_unrecognized: bool,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            retry_unrecognized: true,
        }
    }
}

impl ErrorClassifier {
    /// Create a classifier with an explicit policy for unrecognized errors.
    #[must_use]
    pub const fn new(retry_unrecognized: bool) -> Self {
        Self { retry_unrecognized }
    }

    /// Whether unrecognized errors are retried.
    #[must_use]
    pub const fn retries_unrecognized(&self) -> bool {
        self.retry_unrecognized
    }

    /// Check if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_common::{ErrorClassifier, PlatformError};
    ///
    /// let classifier = ErrorClassifier::default();
    /// assert!(classifier.is_retryable(&PlatformError::Grpc(tonic::Status::unavailable("down"))));
    /// assert!(!classifier.is_retryable(&PlatformError::NotFound("user".to_string())));
    /// ```
    #[must_use]
    pub fn is_retryable(&self, error: &PlatformError) -> bool {
        match error {
            PlatformError::Grpc(status) => is_retryable_code(status.code()),
            PlatformError::Transport(_)
            | PlatformError::Unavailable(_)
            | PlatformError::Timeout(_)
            | PlatformError::RateLimited => true,
            PlatformError::Other(_) => self.retry_unrecognized,
            PlatformError::CircuitOpen { .. }
            | PlatformError::RetriesExhausted { .. }
            | PlatformError::Cancelled
            | PlatformError::NotFound(_)
            | PlatformError::InvalidInput(_)
            | PlatformError::Validation(_)
            | PlatformError::Internal(_) => false,
        }
    }
}
