//! Proxy configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use ocrq_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::rewrite::ImageCacheRewrite;

/// Default queue jobs are submitted to.
pub const DEFAULT_QUEUE: &str = "ocr";

/// Default time to wait for a job, in seconds.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 30;

/// Default first poll delay, in seconds.
pub const DEFAULT_TASK_INITIAL_BACKOFF_SECS: f64 = 0.5;

/// Submit and poll settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ProxyConfig {
    /// Name of the job queue to submit to.
    #[cfg_attr(
        feature = "config",
        arg(long = "proxy-queue", env = "PROXY_QUEUE", default_value = DEFAULT_QUEUE)
    )]
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Seconds to wait for a job before cancelling it.
    #[cfg_attr(
        feature = "config",
        arg(long = "task-timeout-sec", env = "TASK_TIMEOUT_SEC", default_value_t = DEFAULT_TASK_TIMEOUT_SECS)
    )]
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// First delay between two polls, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "task-initial-backoff-sec",
            env = "TASK_INITIAL_BACKOFF_SEC",
            default_value_t = DEFAULT_TASK_INITIAL_BACKOFF_SECS
        )
    )]
    #[serde(default = "default_task_initial_backoff_secs")]
    pub task_initial_backoff_secs: f64,

    /// Rewrite image URLs under the cache prefixes.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "use-image-cache",
            env = "USE_IMAGE_CACHE",
            default_value_t = true,
            action = clap::ArgAction::Set
        )
    )]
    #[serde(default = "default_use_image_cache")]
    pub use_image_cache: bool,

    /// URL prefix of images served from the cache.
    #[cfg_attr(feature = "config", arg(long = "cache-source-prefix", env = "CACHE_SOURCE_PREFIX"))]
    #[serde(default)]
    pub cache_source_prefix: Option<String>,

    /// Prefix replacing `cache_source_prefix`.
    #[cfg_attr(feature = "config", arg(long = "cache-target-prefix", env = "CACHE_TARGET_PREFIX"))]
    #[serde(default)]
    pub cache_target_prefix: Option<String>,
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_owned()
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

fn default_task_initial_backoff_secs() -> f64 {
    DEFAULT_TASK_INITIAL_BACKOFF_SECS
}

fn default_use_image_cache() -> bool {
    true
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            task_initial_backoff_secs: DEFAULT_TASK_INITIAL_BACKOFF_SECS,
            use_image_cache: true,
            cache_source_prefix: None,
            cache_target_prefix: None,
        }
    }
}

impl ProxyConfig {
    /// Sets the timeout and initial backoff.
    pub fn with_timing(mut self, timeout_secs: u64, initial_backoff_secs: f64) -> Self {
        self.task_timeout_secs = timeout_secs;
        self.task_initial_backoff_secs = initial_backoff_secs;
        self
    }

    /// Sets the cache prefixes.
    pub fn with_cache_prefixes(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.cache_source_prefix = Some(source.into());
        self.cache_target_prefix = Some(target.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.task_initial_backoff_secs).unwrap_or_default()
    }

    /// Returns the URL rewrite selected by the cache settings.
    pub fn image_cache_rewrite(&self) -> ImageCacheRewrite {
        match (
            self.use_image_cache,
            &self.cache_source_prefix,
            &self.cache_target_prefix,
        ) {
            (true, Some(source), Some(target)) => ImageCacheRewrite::new(source, target),
            _ => ImageCacheRewrite::disabled(),
        }
    }

    /// Checks that timing values are usable and cache prefixes come in pairs.
    pub fn validate(&self) -> Result<()> {
        if self.task_timeout_secs == 0 {
            return Err(Error::configuration().with_message("task timeout must be positive"));
        }

        let backoff = self.task_initial_backoff_secs;
        if !backoff.is_finite() || backoff <= 0.0 {
            return Err(Error::configuration().with_message(format!(
                "task initial backoff must be a positive number of seconds, got {backoff}"
            )));
        }

        if self.cache_source_prefix.is_some() != self.cache_target_prefix.is_some() {
            return Err(Error::configuration()
                .with_message("cache source and target prefixes must be set together"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.initial_backoff(), Duration::from_millis(500));
        assert!(config.use_image_cache);
        assert!(config.validate().is_ok());
        assert!(!config.image_cache_rewrite().is_enabled());
    }

    #[test]
    fn rewrite_requires_both_prefixes_and_the_flag() {
        let mut config = ProxyConfig::default().with_cache_prefixes("https://a/", "http://b/");
        assert!(config.image_cache_rewrite().is_enabled());

        config.use_image_cache = false;
        assert!(!config.image_cache_rewrite().is_enabled());
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(ProxyConfig::default().with_timing(0, 0.5).validate().is_err());
        assert!(ProxyConfig::default().with_timing(30, 0.0).validate().is_err());
        assert!(ProxyConfig::default().with_timing(30, f64::NAN).validate().is_err());

        let half = ProxyConfig {
            cache_source_prefix: Some("https://a/".into()),
            ..Default::default()
        };
        assert!(half.validate().is_err());
    }
}
