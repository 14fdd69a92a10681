//! Stream Tap Configuration Settings
//!
//! Configuration types for the stream tap, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::feed::client::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DELIVERY_CAPACITY, DEFAULT_ENDPOINT,
};
use crate::infrastructure::feed::recycler::DEFAULT_RECYCLE_INTERVAL;
use crate::infrastructure::signing::{SigningCredentials, SigningError};

/// Streaming connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Interval between forced connection recycles.
    pub recycle_interval: Duration,
    /// TCP connect timeout per attempt.
    pub connect_timeout: Duration,
    /// Delivery channel capacity.
    pub delivery_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            recycle_interval: DEFAULT_RECYCLE_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
        }
    }
}

/// Complete stream tap configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Filter stream endpoint URL.
    pub endpoint: String,
    /// Signing credentials.
    pub credentials: SigningCredentials,
    /// Streaming connection settings.
    pub stream: StreamSettings,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// Required: `FIRETAP_CONSUMER_KEY`, `FIRETAP_CONSUMER_SECRET`,
    /// `FIRETAP_ACCESS_TOKEN`, `FIRETAP_TOKEN_SECRET`. Everything else falls
    /// back to production defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = SigningCredentials::new(
            require_env("FIRETAP_CONSUMER_KEY")?,
            require_env("FIRETAP_CONSUMER_SECRET")?,
            require_env("FIRETAP_ACCESS_TOKEN")?,
            require_env("FIRETAP_TOKEN_SECRET")?,
        )?;

        let endpoint =
            std::env::var("FIRETAP_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        let stream = StreamSettings {
            recycle_interval: parse_env_duration_secs(
                "FIRETAP_RECYCLE_INTERVAL_SECS",
                StreamSettings::default().recycle_interval,
            ),
            connect_timeout: parse_env_duration_secs(
                "FIRETAP_CONNECT_TIMEOUT_SECS",
                StreamSettings::default().connect_timeout,
            ),
            delivery_capacity: parse_env_usize(
                "FIRETAP_DELIVERY_CAPACITY",
                StreamSettings::default().delivery_capacity,
            ),
        };

        Ok(Self {
            endpoint,
            credentials,
            stream,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Credentials were rejected.
    #[error("invalid signing credentials: {0}")]
    Credentials(#[from] SigningError),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value = std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
