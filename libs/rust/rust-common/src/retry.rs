//! Retry policy implementation with exponential backoff.
//!
//! The [`Retrier`] runs an operation up to `max_retries + 1` times. Between
//! attempts it consults the [`ErrorClassifier`] and sleeps for the delay given
//! by [`compute_delay`]. Both the attempt itself and the sleep observe the
//! caller's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::compute_delay;
use crate::circuit_breaker::CircuitBreaker;
use crate::classifier::ErrorClassifier;
use crate::PlatformError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create a new retry config with custom initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Create a new retry config with a custom backoff multiplier.
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Create a new retry config without jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Waits out the delay between two attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    /// Sleep for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Executes operations with bounded retries and exponential backoff.
#[derive(Clone)]
pub struct Retrier {
    config: RetryConfig,
    classifier: ErrorClassifier,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    /// Create a new retrier with the given configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: ErrorClassifier::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Create a retrier with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Replace the error classifier.
    #[must_use]
    pub const fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Get the retry configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Get the error classifier.
    #[must_use]
    pub const fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Get the maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Check if an error should be retried after the given attempt.
    #[must_use]
    pub fn should_retry(&self, error: &PlatformError, attempt: u32) -> bool {
        attempt < self.config.max_retries && self.classifier.is_retryable(error)
    }

    /// Execute an async operation with retries.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::Cancelled`] if `cancel` fires before or during an
    ///   attempt, or while waiting between attempts.
    /// - The operation's error, unchanged, when it is not retryable.
    /// - [`PlatformError::RetriesExhausted`] wrapping the last failure when
    ///   every attempt failed with a retryable error.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(PlatformError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(PlatformError::Cancelled),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if error.is_cancelled() || !self.classifier.is_retryable(&error) {
                return Err(error);
            }
            if attempt >= self.config.max_retries {
                return Err(PlatformError::RetriesExhausted {
                    max_retries: self.config.max_retries,
                    last: Box::new(error),
                });
            }

            let delay = compute_delay(attempt, &self.config);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying after transient failure"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PlatformError::Cancelled),
                () = self.sleeper.sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Execute an async operation with retries, asking `breaker` for
    /// permission before every attempt.
    ///
    /// A refused attempt fails with [`PlatformError::CircuitOpen`], which is
    /// never retried. Each admitted attempt's outcome is recorded on the
    /// breaker before the next step is decided.
    ///
    /// # Errors
    ///
    /// Same as [`Retrier::execute`], plus the breaker refusal.
    pub async fn execute_with_circuit_breaker<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        breaker: &CircuitBreaker,
        mut operation: F,
    ) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        self.execute(cancel, move || breaker.call(cancel, operation()))
            .await
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::with_defaults()
    }
}
