//! Recognition engine selection.

use std::sync::Arc;

use ocrq_core::EngineLoader;

use super::WorkerArgs;

/// Creates the engine loader linked into this build.
///
/// # Errors
///
/// Returns an error if no engine backend was compiled in.
#[cfg(feature = "mock")]
pub fn create_engine_loader(args: &WorkerArgs) -> anyhow::Result<Arc<dyn EngineLoader>> {
    use ocrq_test::{MockEngine, MockEngineLoader};

    let engine = MockEngine::new(args.mock.clone());
    Ok(Arc::new(MockEngineLoader::new(engine)))
}

/// Creates the engine loader linked into this build.
///
/// # Errors
///
/// Returns an error if no engine backend was compiled in.
#[cfg(not(feature = "mock"))]
pub fn create_engine_loader(_args: &WorkerArgs) -> anyhow::Result<Arc<dyn EngineLoader>> {
    anyhow::bail!("no recognition engine is linked into this build, rebuild with the `mock` feature")
}
