//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use ocrq_nats::NatsConfig;
use serde::{Deserialize, Serialize};

/// Default queue the worker consumes.
pub const DEFAULT_QUEUE: &str = "ocr";

/// Default image download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 10;

/// Default delay between fetches when the queue is empty.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 500;

/// Default interval of the cancellation check of a running job.
pub const DEFAULT_CANCEL_CHECK_INTERVAL_MS: u64 = 1000;

/// Complete worker configuration.
///
/// Combines the broker connection with job execution settings. This is the
/// main configuration type passed to [`WorkerState::from_config`].
///
/// [`WorkerState::from_config`]: super::WorkerState::from_config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct WorkerConfig {
    /// NATS configuration.
    #[cfg_attr(feature = "config", command(flatten))]
    pub nats: NatsConfig,

    /// Name of the job queue to consume.
    #[cfg_attr(
        feature = "config",
        arg(long = "worker-queue", env = "WORKER_QUEUE", default_value = DEFAULT_QUEUE)
    )]
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Directory holding the recognition engine configuration and models.
    #[cfg_attr(
        feature = "config",
        arg(long = "engine-config-dir", env = "ENGINE_CONFIG_DIR", default_value = "./engine")
    )]
    pub engine_config_dir: PathBuf,

    /// Loads the engine at startup instead of on the first job.
    #[cfg_attr(
        feature = "config",
        arg(long = "engine-preload", env = "ENGINE_PRELOAD", default_value_t = false)
    )]
    #[serde(default)]
    pub preload_engine: bool,

    /// Image download timeout in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "download-timeout-secs",
            env = "DOWNLOAD_TIMEOUT_SECS",
            default_value_t = DEFAULT_DOWNLOAD_TIMEOUT_SECS
        )
    )]
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Gray level used to pad line images to a common shape.
    #[cfg_attr(
        feature = "config",
        arg(long = "pad-color", env = "PAD_COLOR", default_value_t = ocrq_core::normalize::DEFAULT_BACKGROUND)
    )]
    #[serde(default = "default_pad_color")]
    pub pad_color: u8,

    /// Name reported on job records (defaults to `ocrq-worker-<pid>`).
    #[cfg_attr(feature = "config", arg(long = "worker-name", env = "WORKER_NAME"))]
    #[serde(default)]
    pub worker_name: Option<String>,

    /// Delay in milliseconds between fetches when the queue is empty.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-idle-interval-ms",
            env = "WORKER_IDLE_INTERVAL_MS",
            default_value_t = DEFAULT_IDLE_INTERVAL_MS
        )
    )]
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Interval in milliseconds at which a running job checks for termination.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-cancel-check-interval-ms",
            env = "WORKER_CANCEL_CHECK_INTERVAL_MS",
            default_value_t = DEFAULT_CANCEL_CHECK_INTERVAL_MS
        )
    )]
    #[serde(default = "default_cancel_check_interval_ms")]
    pub cancel_check_interval_ms: u64,
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_owned()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_pad_color() -> u8 {
    ocrq_core::normalize::DEFAULT_BACKGROUND
}

fn default_idle_interval_ms() -> u64 {
    DEFAULT_IDLE_INTERVAL_MS
}

fn default_cancel_check_interval_ms() -> u64 {
    DEFAULT_CANCEL_CHECK_INTERVAL_MS
}

impl WorkerConfig {
    /// Creates a worker configuration with default execution settings.
    pub fn new(nats: NatsConfig, engine_config_dir: impl Into<PathBuf>) -> Self {
        Self {
            nats,
            queue: default_queue(),
            engine_config_dir: engine_config_dir.into(),
            preload_engine: false,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            pad_color: default_pad_color(),
            worker_name: None,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
            cancel_check_interval_ms: DEFAULT_CANCEL_CHECK_INTERVAL_MS,
        }
    }

    /// Sets the queue to consume.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Returns the configured worker name or one derived from the process id.
    pub fn worker_name(&self) -> String {
        match &self.worker_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("ocrq-worker-{}", std::process::id()),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn cancel_check_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_check_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkerConfig::new(NatsConfig::default(), "/models");
        assert_eq!(config.queue, "ocr");
        assert_eq!(config.download_timeout(), Duration::from_secs(10));
        assert_eq!(config.pad_color, 255);
        assert!(!config.preload_engine);
    }

    #[test]
    fn worker_name_falls_back_to_pid() {
        let mut config = WorkerConfig::new(NatsConfig::default(), "/models");
        assert!(config.worker_name().starts_with("ocrq-worker-"));
        config.worker_name = Some("gpu-0".into());
        assert_eq!(config.worker_name(), "gpu-0");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: WorkerConfig = serde_json::from_value(serde_json::json!({
            "nats": serde_json::to_value(NatsConfig::default()).unwrap(),
            "engine_config_dir": "/models",
        }))
        .unwrap();
        assert_eq!(config.queue, DEFAULT_QUEUE);
        assert_eq!(config.cancel_check_interval(), Duration::from_secs(1));
    }
}
