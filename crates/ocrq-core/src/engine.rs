//! Recognition engine capability.
//!
//! The models themselves are opaque to ocrq: an engine only has to declare
//! its line input geometry and answer the recognition calls below. Calls are
//! synchronous and CPU/GPU bound; async callers run them on a blocking pool.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::answer::OcrEngineInfo;
use crate::normalize::NormalizedBatch;
use crate::page::{LayoutPage, OcrPage, TablePage};
use crate::{Error, Result};

/// Transcription of one normalized line image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecognition {
    pub text: String,
    pub confidence: f32,
}

impl LineRecognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A loaded recognition model.
pub trait RecognitionEngine: Send + Sync {
    /// Static provenance reported with every transcription.
    fn info(&self) -> &OcrEngineInfo;

    /// Height in pixels of the line images expected by [`Self::recognize_lines`].
    fn line_px_height(&self) -> u32;

    /// Maximum width in pixels of a line image.
    fn max_input_horizontal_pixels(&self) -> u32;

    /// Detects and recognizes every text line of `image`.
    ///
    /// Returned geometry is local to `image`.
    fn recognize_page(&self, image: &RgbImage) -> Result<OcrPage>;

    /// Recognizes one text line per batch entry, in batch order.
    fn recognize_lines(&self, batch: &NormalizedBatch) -> Result<Vec<LineRecognition>>;

    /// Detects layout blocks of `image`.
    fn detect_layout(&self, _image: &RgbImage) -> Result<LayoutPage> {
        Err(Error::unsupported().with_message(format!(
            "{} does not support layout detection",
            self.info().name
        )))
    }

    /// Recognizes table structure of `image`.
    fn recognize_tables(&self, _image: &RgbImage) -> Result<TablePage> {
        Err(Error::unsupported().with_message(format!(
            "{} does not support table recognition",
            self.info().name
        )))
    }
}

/// Constructs an engine from its on-disk configuration.
///
/// Loading is expensive (model weights); callers memoize the result.
pub trait EngineLoader: Send + Sync {
    fn load(&self, config_dir: &Path) -> Result<Arc<dyn RecognitionEngine>>;
}

impl<F> EngineLoader for F
where
    F: Fn(&Path) -> Result<Arc<dyn RecognitionEngine>> + Send + Sync,
{
    fn load(&self, config_dir: &Path) -> Result<Arc<dyn RecognitionEngine>> {
        self(config_dir)
    }
}
