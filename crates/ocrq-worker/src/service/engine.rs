//! Process-wide recognition engine handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocrq_core::{EngineLoader, Error, RecognitionEngine, Result};
use tokio::sync::OnceCell;

use crate::TRACING_TARGET_ENGINE;

/// Lazily loaded recognition engine, shared by every job of the process.
///
/// The first [`get`](Self::get) loads the engine on the blocking pool;
/// concurrent callers wait for that load instead of starting their own. A
/// failed load is not cached, so the next job retries it.
pub struct EngineCell {
    loader: Arc<dyn EngineLoader>,
    config_dir: PathBuf,
    engine: OnceCell<Arc<dyn RecognitionEngine>>,
}

impl EngineCell {
    pub fn new(loader: Arc<dyn EngineLoader>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            config_dir: config_dir.into(),
            engine: OnceCell::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns `true` once the engine has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    /// Returns the engine, loading it on first use.
    pub async fn get(&self) -> Result<Arc<dyn RecognitionEngine>> {
        let engine = self.engine.get_or_try_init(|| self.load()).await?;
        Ok(Arc::clone(engine))
    }

    #[tracing::instrument(skip(self), fields(config_dir = %self.config_dir.display()), target = TRACING_TARGET_ENGINE)]
    async fn load(&self) -> Result<Arc<dyn RecognitionEngine>> {
        if !self.config_dir.is_dir() {
            return Err(Error::configuration().with_message(format!(
                "engine configuration directory {} does not exist",
                self.config_dir.display()
            )));
        }

        tracing::info!(target: TRACING_TARGET_ENGINE, "Loading recognition engine");
        let started = std::time::Instant::now();

        let loader = Arc::clone(&self.loader);
        let config_dir = self.config_dir.clone();
        let engine = tokio::task::spawn_blocking(move || loader.load(&config_dir))
            .await
            .map_err(|e| {
                Error::engine()
                    .with_message("engine loader did not complete")
                    .with_source(e)
            })??;

        let info = engine.info();
        tracing::info!(
            target: TRACING_TARGET_ENGINE,
            engine = %info.name,
            model_version = %info.model_version,
            line_px_height = engine.line_px_height(),
            elapsed_ms = started.elapsed().as_millis(),
            "Recognition engine loaded"
        );
        Ok(engine)
    }
}

impl fmt::Debug for EngineCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineCell")
            .field("config_dir", &self.config_dir)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use ocrq_core::ErrorKind;
    use ocrq_test::MockEngineLoader;

    use super::*;

    #[tokio::test]
    async fn loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockEngineLoader::default();
        let cell = EngineCell::new(Arc::new(loader.clone()), dir.path());

        assert!(!cell.is_loaded());
        let first = cell.get().await.unwrap();
        let second = cell.get().await.unwrap();

        assert!(cell.is_loaded());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert_eq!(loader.load_dirs(), vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn concurrent_first_use_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockEngineLoader::default();
        let cell = Arc::new(EngineCell::new(Arc::new(loader.clone()), dir.path()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                tokio::spawn(async move { cell.get().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn missing_config_dir_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("models");
        let loader = MockEngineLoader::default();
        let cell = EngineCell::new(Arc::new(loader.clone()), &missing);

        let error = cell.get().await.err().unwrap();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert_eq!(loader.loads(), 0);

        std::fs::create_dir(&missing).unwrap();
        assert!(cell.get().await.is_ok());
        assert_eq!(loader.loads(), 1);
    }
}
