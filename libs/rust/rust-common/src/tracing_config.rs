//! Structured logging setup.
//!
//! Installs the global `tracing` subscriber used by gateway-platform services.
//! `RUST_LOG` takes precedence over the configured level.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" | "console" => Ok(Self::Text),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Text => "text",
        })
    }
}

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// Log format name not recognized
    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    /// Level directive could not be parsed
    #[error("invalid log level {level:?}: {reason}")]
    InvalidLevel {
        /// Offending directive
        level: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error(transparent)]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging configuration for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Service name logged when the subscriber is installed
    pub service_name: String,
    /// Level directive, e.g. `info` or `gateway=debug,tonic=warn`
    pub log_level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "gateway-service".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the level directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Select the output format by name. Unknown names fall back to text.
    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.parse().unwrap_or(LogFormat::Text);
        self
    }

    /// Filter built from `RUST_LOG`, or from the configured level.
    ///
    /// # Errors
    ///
    /// Returns [`TracingError::InvalidLevel`] when `RUST_LOG` is unset and the
    /// configured level does not parse.
    pub fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.log_level).map_err(|e| TracingError::InvalidLevel {
            level: self.log_level.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails on an invalid level or when a subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    tracing::info!(
        service = %config.service_name,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}
