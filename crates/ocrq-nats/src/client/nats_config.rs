//! NATS connection configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Default values
const DEFAULT_URL: &str = "nats://127.0.0.1:4222";
const DEFAULT_NAME: &str = "ocrq";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RECONNECTS: usize = 10;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;
const MAX_RECONNECT_DELAY_SECS: u64 = 30;
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Connection settings shared by the proxy and the workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct NatsConfig {
    /// NATS server URL (comma-separated for clustering)
    #[cfg_attr(
        feature = "config",
        arg(long = "nats-url", env = "NATS_URL", default_value = DEFAULT_URL)
    )]
    pub nats_url: String,

    /// Authentication token (anonymous when unset)
    #[cfg_attr(feature = "config", arg(long = "nats-token", env = "NATS_TOKEN"))]
    pub nats_token: Option<String>,

    /// Client connection name shown in server monitoring
    #[cfg_attr(
        feature = "config",
        arg(long = "nats-client-name", env = "NATS_CLIENT_NAME")
    )]
    pub nats_client_name: Option<String>,

    /// Connection timeout in seconds
    #[cfg_attr(
        feature = "config",
        arg(
            long = "nats-connect-timeout",
            env = "NATS_CONNECT_TIMEOUT_SECS",
            default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS
        )
    )]
    pub nats_connect_timeout_secs: u64,

    /// Maximum number of reconnection attempts (0 = unlimited)
    #[cfg_attr(
        feature = "config",
        arg(
            long = "nats-max-reconnects",
            env = "NATS_MAX_RECONNECTS",
            default_value_t = DEFAULT_MAX_RECONNECTS
        )
    )]
    pub nats_max_reconnects: usize,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl NatsConfig {
    /// Creates an anonymous configuration for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            nats_url: url.into(),
            nats_token: None,
            nats_client_name: None,
            nats_connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            nats_max_reconnects: DEFAULT_MAX_RECONNECTS,
        }
    }

    /// Returns the client name, using the default if not set.
    #[inline]
    pub fn name(&self) -> &str {
        self.nats_client_name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    /// Returns the server URLs (splits comma-separated URLs).
    pub fn servers(&self) -> Vec<&str> {
        self.nats_url.split(',').map(str::trim).collect()
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.nats_connect_timeout_secs.max(1))
    }

    #[inline]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(DEFAULT_PING_INTERVAL_SECS)
    }

    /// Exponential reconnect delay for the given attempt, capped at 30s.
    pub fn reconnect_delay(attempts: usize) -> Duration {
        let exponent = attempts.min(16) as u32;
        let delay = DEFAULT_RECONNECT_DELAY_MS.saturating_mul(2_u64.saturating_pow(exponent));
        Duration::from_millis(delay).min(Duration::from_secs(MAX_RECONNECT_DELAY_SECS))
    }

    /// Returns the max reconnects as Option (0 means unlimited).
    #[inline]
    pub fn max_reconnects_option(&self) -> Option<usize> {
        match self.nats_max_reconnects {
            0 => None,
            max => Some(max),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.nats_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.nats_client_name = Some(name.into());
        self
    }

    /// Validates URLs and the optional token.
    pub fn validate(&self) -> Result<()> {
        for server in self.servers() {
            if server.is_empty() {
                return Err(Error::invalid_config("server URL cannot be empty"));
            }
            if !(server.starts_with("nats://") || server.starts_with("tls://")) {
                return Err(Error::invalid_config(format!(
                    "invalid server URL format: {server}"
                )));
            }
        }

        if self.nats_token.as_deref().is_some_and(str::is_empty) {
            return Err(Error::invalid_config("token cannot be empty when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NatsConfig::default();
        assert_eq!(config.servers(), vec![DEFAULT_URL]);
        assert_eq!(config.name(), "ocrq");
        assert_eq!(config.nats_token, None);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_reconnects_option(), Some(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_and_cluster_urls() {
        let config = NatsConfig::new("nats://a:4222, nats://b:4222")
            .with_token("secret")
            .with_name("ocrq-worker");

        assert_eq!(config.servers(), vec!["nats://a:4222", "nats://b:4222"]);
        assert_eq!(config.name(), "ocrq-worker");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_urls_and_tokens() {
        assert!(NatsConfig::new("").validate().is_err());
        assert!(NatsConfig::new("http://localhost:4222").validate().is_err());
        assert!(NatsConfig::default().with_token("").validate().is_err());
    }

    #[test]
    fn unlimited_reconnects() {
        let mut config = NatsConfig::default();
        config.nats_max_reconnects = 0;
        assert_eq!(config.max_reconnects_option(), None);
    }

    #[test]
    fn reconnect_delay_is_capped() {
        assert_eq!(NatsConfig::reconnect_delay(0), Duration::from_millis(500));
        assert_eq!(NatsConfig::reconnect_delay(2), Duration::from_secs(2));
        assert_eq!(NatsConfig::reconnect_delay(40), Duration::from_secs(30));
    }
}
