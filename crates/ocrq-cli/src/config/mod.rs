//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── proxy: ProxyArgs
//! │   ├── server: ServerConfig   # Host, port, timeouts, concurrency
//! │   ├── nats: NatsConfig       # Broker connection
//! │   └── proxy: ProxyConfig     # Queue, task timeout, backoff, cache prefixes
//! └── worker: WorkerArgs
//!     ├── worker: WorkerConfig   # Broker connection, queue, engine, download
//!     └── mock: MockEngineConfig # Mock engine (feature-gated)
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//!
//! # Example
//!
//! ```bash
//! ocrq proxy --port 8080 --task-timeout-sec 45
//! NATS_URL=nats://broker:4222 ocrq worker --engine-config-dir /models
//! ```

mod engine;
mod server;

use std::process;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
pub use engine::create_engine_loader;
use ocrq_nats::NatsConfig;
use ocrq_proxy::ProxyConfig;
use ocrq_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "ocrq")]
#[command(about = "Asynchronous OCR job proxy and worker")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Which side of the system to run.
#[derive(Debug, Clone, Subcommand, Serialize, Deserialize)]
pub enum Command {
    /// Serves the HTTP API and forwards requests to the job queue.
    Proxy(ProxyArgs),
    /// Consumes jobs and runs the recognition engine.
    Worker(WorkerArgs),
}

/// Configuration of the `proxy` subcommand.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ProxyArgs {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub nats: NatsConfig,

    #[command(flatten)]
    pub proxy: ProxyConfig,
}

impl ProxyArgs {
    /// Validates the server and proxy settings against each other.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.proxy
            .validate()
            .context("invalid proxy configuration")?;

        // A request that times out first would drop its job without cancelling it.
        if self.server.request_timeout <= self.proxy.task_timeout_secs {
            return Err(anyhow!(
                "Request timeout ({}s) must exceed the task timeout ({}s).",
                self.server.request_timeout,
                self.proxy.task_timeout_secs
            ));
        }

        Ok(())
    }

    /// Logs the proxy configuration (no credentials).
    pub fn log(&self) {
        self.server.log();
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            nats_url = %self.nats.nats_url,
            queue = %self.proxy.queue,
            task_timeout_secs = self.proxy.task_timeout_secs,
            task_initial_backoff_secs = self.proxy.task_initial_backoff_secs,
            use_image_cache = self.proxy.use_image_cache,
            "Proxy configured"
        );
    }
}

/// Configuration of the `worker` subcommand.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub worker: WorkerConfig,

    /// Maximum time in seconds to wait for the running job on shutdown.
    #[arg(long = "worker-shutdown-timeout", env = "WORKER_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,

    /// Mock recognition engine configuration.
    #[cfg(feature = "mock")]
    #[command(flatten)]
    pub mock: ocrq_test::MockEngineConfig,
}

impl WorkerArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.worker
            .nats
            .validate()
            .context("invalid NATS configuration")?;
        if self.shutdown_timeout == 0 {
            return Err(anyhow!("Worker shutdown timeout must be at least 1 second."));
        }
        Ok(())
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Logs the worker configuration (no credentials).
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            nats_url = %self.worker.nats.nats_url,
            queue = %self.worker.queue,
            worker = %self.worker.worker_name(),
            engine_config_dir = %self.worker.engine_config_dir.display(),
            preload_engine = self.worker.preload_engine,
            download_timeout_secs = self.worker.download_timeout_secs,
            pad_color = self.worker.pad_color,
            "Worker configured"
        );
    }
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so its values
    /// act as `env` fallbacks.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    /// Validates the selected subcommand's configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Proxy(args) => args.validate(),
            Command::Worker(args) => args.validate(),
        }
    }

    /// Logs build information and the selected configuration.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        match &self.command {
            Command::Proxy(args) => args.log(),
            Command::Worker(args) => args.log(),
        }
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [
            cfg!(feature = "dotenv").then_some("dotenv"),
            cfg!(feature = "mock").then_some("mock"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
