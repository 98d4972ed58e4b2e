//! Job consumer loop.
//!
//! One [`OcrWorker`] per process pulls jobs from the shared durable consumer
//! and runs them one at a time through the [`OcrPipeline`]. The queue is
//! reached through [`JobConsumer`], so the loop runs against NATS or an
//! in-memory consumer alike.
//!
//! [`JobConsumer`]: ocrq_core::JobConsumer
//!
//! [`OcrPipeline`]: crate::pipeline::OcrPipeline

mod ocr;

pub use ocr::OcrWorker;
