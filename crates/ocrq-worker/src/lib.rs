#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for the consumer loop.
pub const TRACING_TARGET_WORKER: &str = "ocrq_worker::worker";

/// Tracing target for job execution.
pub const TRACING_TARGET_PIPELINE: &str = "ocrq_worker::pipeline";

/// Tracing target for engine loading.
pub const TRACING_TARGET_ENGINE: &str = "ocrq_worker::engine";

mod error;
pub mod handler;
pub mod pipeline;
pub mod service;

pub use error::{Result, WorkerError};
pub use handler::OcrWorker;
pub use pipeline::OcrPipeline;
pub use service::{EngineCell, HttpImageSource, WorkerConfig, WorkerState};
