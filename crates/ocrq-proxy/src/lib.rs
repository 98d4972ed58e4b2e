#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for the submit/poll state machine.
pub const TRACING_TARGET_TRANSCRIBE: &str = "ocrq_proxy::transcribe";

/// Tracing target for HTTP handlers.
pub const TRACING_TARGET_HANDLER: &str = "ocrq_proxy::handler";

mod backoff;
mod config;
pub mod handler;
mod proxy;
mod rewrite;

pub use backoff::Backoff;
pub use config::ProxyConfig;
pub use handler::{OcrRequest, routes};
pub use proxy::OcrProxy;
pub use rewrite::ImageCacheRewrite;
