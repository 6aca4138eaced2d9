//! Type-Safe Configuration with Validation
//!
//! Reads per-backend connection, retry and circuit breaker settings from the
//! environment. Every backend service `{P}` (`AUTH`, `CHAT`, `EMPLOYEE`,
//! `STRUCTURE`) is configured through `{P}_SERVICE_*` variables.

use std::env;
use std::time::Duration;

use rust_common::{CircuitBreakerConfig, RetryConfig};
use thiserror::Error;
use url::Url;

/// Backend services fronted by the gateway: name, env prefix, default address.
const BACKENDS: [(&str, &str, &str); 4] = [
    ("auth", "AUTH", "auth-service:9090"),
    ("chat", "CHAT", "chat-service:9092"),
    ("employee", "EMPLOYEE", "employee-service:9091"),
    ("structure", "STRUCTURE", "structure-service:9093"),
];

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Variable holding the address
        field: String,
        /// Parser message
        reason: String,
    },

    /// Invalid duration string
    #[error("Invalid duration for {name}: {value:?}")]
    InvalidDuration {
        /// Variable name
        name: String,
        /// Rejected value
        value: String,
    },

    /// Backoff multiplier must grow the delay
    #[error("Invalid backoff multiplier for {service}: must be greater than 1")]
    InvalidMultiplier {
        /// Backend service name
        service: String,
    },

    /// Maximum delay below the initial delay
    #[error("Invalid retry delays for {service}: max delay must be at least the initial delay")]
    InvalidDelayRange {
        /// Backend service name
        service: String,
    },

    /// Invalid threshold value
    #[error("Invalid half-open probe limit for {service}: must be greater than 0")]
    InvalidThreshold {
        /// Backend service name
        service: String,
    },

    /// A duration that must be positive is zero
    #[error("Invalid {field} for {service}: must be greater than 0")]
    ZeroDuration {
        /// Backend service name
        service: String,
        /// Setting that was zero
        field: &'static str,
    },

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Connection, retry and breaker settings of one backend service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name (`auth`, `chat`, ...)
    pub name: String,
    /// Backend address
    pub address: Url,
    /// Time allowed to establish the channel
    pub connect_timeout: Duration,
    /// Retry policy for calls to this service
    pub retry: RetryConfig,
    /// Circuit breaker guarding this service
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ServiceConfig {
    /// Settings with the stock retry and breaker policies.
    #[must_use]
    pub fn new(name: impl Into<String>, address: Url) -> Self {
        Self {
            name: name.into(),
            address,
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the circuit breaker configuration.
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let service = || self.name.clone();
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                service: service(),
                field: "connect timeout",
            });
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier { service: service() });
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ConfigError::InvalidDelayRange { service: service() });
        }
        if self.circuit_breaker.max_half_open_probes == 0 {
            return Err(ConfigError::InvalidThreshold { service: service() });
        }
        if self.circuit_breaker.open_duration.is_zero() {
            return Err(ConfigError::ZeroDuration {
                service: service(),
                field: "circuit breaker timeout",
            });
        }
        Ok(())
    }
}

/// Gateway configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend services, in a fixed order
    pub services: Vec<ServiceConfig>,
    /// Log level filter
    pub log_level: String,
    /// Log output format (`json` or `text`)
    pub log_format: String,
    /// Whether errors with no recognizable status are retried
    pub retry_unrecognized_errors: bool,
    /// Interval between registry health refreshes
    pub health_check_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable fails to parse or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a
    /// variable or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value fails to parse or the result
    /// fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let services = BACKENDS
            .iter()
            .map(|(name, prefix, address)| env.service(name, prefix, address))
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            services,
            log_level: env.string("LOG_LEVEL", "info"),
            log_format: env.string("LOG_FORMAT", "json"),
            retry_unrecognized_errors: env.parse("RETRY_UNRECOGNIZED_ERRORS", true)?,
            health_check_interval: env.duration("HEALTH_CHECK_INTERVAL", Duration::from_secs(30))?,
            shutdown_timeout: env.duration("SHUTDOWN_TIMEOUT", Duration::from_secs(30))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for service in &self.services {
            service.validate()?;
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                service: "gateway".to_string(),
                field: "health check interval",
            });
        }
        Ok(())
    }

    /// Settings of the named service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Typed reads over a variable lookup function.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable with a default value.
    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.raw(name) {
            Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn duration(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.raw(name) {
            Some(val) => parse_duration(&val).ok_or_else(|| ConfigError::InvalidDuration {
                name: name.to_string(),
                value: val,
            }),
            None => Ok(default),
        }
    }

    /// Parse an address variable, adding the `http` scheme when missing.
    fn url(&self, name: &str, default: &str) -> Result<Url, ConfigError> {
        let raw = self.string(name, default);
        let raw = raw.trim();
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidUrl {
            field: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn service(&self, name: &str, prefix: &str, address: &str) -> Result<ServiceConfig, ConfigError> {
        let var = |suffix: &str| format!("{prefix}_SERVICE_{suffix}");
        let retry_defaults = RetryConfig::default();
        let breaker_defaults = CircuitBreakerConfig::default();

        let retry = RetryConfig {
            max_retries: self.parse(&var("MAX_RETRIES"), retry_defaults.max_retries)?,
            initial_delay: self.duration(&var("RETRY_DELAY"), retry_defaults.initial_delay)?,
            max_delay: self.duration(&var("MAX_RETRY_DELAY"), retry_defaults.max_delay)?,
            backoff_multiplier: self
                .parse(&var("BACKOFF_MULTIPLIER"), retry_defaults.backoff_multiplier)?,
            jitter: self.parse(&var("RETRY_JITTER"), retry_defaults.jitter)?,
        };
        let circuit_breaker = breaker_defaults
            .clone()
            .with_max_half_open_probes(
                self.parse(&var("CB_MAX_REQUESTS"), breaker_defaults.max_half_open_probes)?,
            )
            .with_rolling_window(self.duration(&var("CB_INTERVAL"), breaker_defaults.rolling_window)?)
            .with_open_duration(self.duration(&var("CB_TIMEOUT"), breaker_defaults.open_duration)?);

        Ok(ServiceConfig {
            name: name.to_string(),
            address: self.url(&var("ADDRESS"), address)?,
            connect_timeout: self.duration(&var("TIMEOUT"), Duration::from_secs(10))?,
            retry,
            circuit_breaker,
        })
    }
}

/// Parse a duration such as `100ms`, `5s`, `1m30s` or `1.5h`.
///
/// A bare `0` is accepted; any other value needs a unit
/// (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let mut nanos = 0.0_f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        nanos += value * nanos_per_unit;
    }

    let nanos = nanos.round();
    (nanos.is_finite() && nanos < u64::MAX as f64).then(|| Duration::from_nanos(nanos as u64))
}
