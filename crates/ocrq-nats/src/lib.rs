#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for NATS client operations.
///
/// Use this target for logging client initialization, configuration, and client-level errors.
pub const TRACING_TARGET_CLIENT: &str = "ocrq_nats::client";

/// Tracing target for NATS key-value store operations.
pub const TRACING_TARGET_KV: &str = "ocrq_nats::kv";

/// Tracing target for the job stream, queue and consumer.
pub const TRACING_TARGET_QUEUE: &str = "ocrq_nats::queue";

/// Tracing target for NATS connection operations.
pub const TRACING_TARGET_CONNECTION: &str = "ocrq_nats::connection";

mod client;
mod error;
pub mod kv;
pub mod queue;

// Re-export async_nats types needed by consumers
pub use async_nats::jetstream;
pub use client::{NatsClient, NatsConfig};
pub use error::{Error, Result};
