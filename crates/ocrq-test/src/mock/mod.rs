//! Mock implementations of the ocrq capability traits.

mod engine;
mod image_source;
mod job_consumer;
mod job_queue;

pub use engine::{MockEngine, MockEngineConfig, MockEngineLoader};
pub use image_source::{MockImageSource, encode_png};
pub use job_consumer::{ConsumerEvent, MockJobConsumer};
pub use job_queue::MockJobQueue;
