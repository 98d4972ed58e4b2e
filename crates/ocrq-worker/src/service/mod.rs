//! Worker state and services.
//!
//! ## Services
//!
//! - [`EngineCell`] - lazily loaded recognition engine
//! - [`HttpImageSource`] - image download with a bounded timeout

mod config;
mod engine;
mod source;
mod state;

pub use config::WorkerConfig;
pub use engine::EngineCell;
pub use source::{DEFAULT_DOWNLOAD_TIMEOUT, HttpImageSource};
pub use state::WorkerState;
