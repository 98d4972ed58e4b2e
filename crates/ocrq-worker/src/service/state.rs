//! Worker application state.

use std::sync::Arc;

use ocrq_core::EngineLoader;
use ocrq_nats::NatsClient;

use super::{EngineCell, HttpImageSource, WorkerConfig};
use crate::pipeline::OcrPipeline;
use crate::{Result, WorkerError};

/// Application state for workers.
///
/// Can be created either directly with [`WorkerState::new`] or from
/// configuration with [`WorkerState::from_config`].
#[derive(Clone)]
pub struct WorkerState {
    /// NATS messaging client.
    pub nats: NatsClient,
    /// Job body shared by every job of this process.
    pub pipeline: OcrPipeline,
    /// Worker behavior settings.
    pub config: WorkerConfig,
}

impl WorkerState {
    /// Creates a new worker state from existing service instances.
    ///
    /// Use this when you already have a connected client (e.g., sharing the
    /// connection with the proxy in a single process).
    pub fn new(nats: NatsClient, pipeline: OcrPipeline, config: WorkerConfig) -> Self {
        Self {
            nats,
            pipeline,
            config,
        }
    }

    /// Creates a new worker state from configuration.
    ///
    /// Connects to NATS and prepares the HTTP image source. The engine itself
    /// is loaded by `loader` on first use, or right away with
    /// [`WorkerConfig::preload_engine`].
    ///
    /// # Errors
    ///
    /// Returns an error if connecting to NATS, building the HTTP client or
    /// preloading the engine fails.
    pub async fn from_config(config: &WorkerConfig, loader: Arc<dyn EngineLoader>) -> Result<Self> {
        let nats = NatsClient::connect(config.nats.clone())
            .await
            .map_err(|e| WorkerError::processing_with_source("Failed to connect to NATS", e))?;

        let source = HttpImageSource::new(config.download_timeout())?;
        let engine = EngineCell::new(loader, config.engine_config_dir.clone());
        let pipeline =
            OcrPipeline::new(Arc::new(engine), Arc::new(source)).with_pad_color(config.pad_color);

        let state = Self::new(nats, pipeline, config.clone());
        if config.preload_engine {
            state.warm_up().await?;
        }
        Ok(state)
    }

    /// Loads the recognition engine if it is not loaded yet.
    pub async fn warm_up(&self) -> Result<()> {
        self.pipeline
            .engine()
            .get()
            .await
            .map(|_| ())
            .map_err(WorkerError::EngineInit)
    }
}
