//! Mock recognition engine for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(feature = "config")]
use clap::Args;
use image::RgbImage;
use ocrq_core::{
    EngineLoader, Error, LayoutBox, LayoutPage, LineRecognition, NormalizedBatch, OcrEngineInfo,
    OcrPage, Polygon, RecognitionEngine, Result, TableCell, TableCol, TablePage, TableRow,
    TextLine,
};
use serde::{Deserialize, Serialize};

/// Configuration for the mock recognition engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct MockEngineConfig {
    /// Height of the line images the mock engine expects.
    #[cfg_attr(feature = "config", arg(long = "mock-line-height", env = "MOCK_LINE_HEIGHT", default_value_t = 40))]
    pub line_px_height: u32,

    /// Maximum width of the line images the mock engine expects.
    #[cfg_attr(feature = "config", arg(long = "mock-max-width", env = "MOCK_MAX_WIDTH", default_value_t = 2048))]
    pub max_input_horizontal_pixels: u32,

    /// Text returned for every recognized line.
    #[cfg_attr(feature = "config", arg(long = "mock-text", env = "MOCK_TEXT", default_value = "mock text"))]
    pub text: String,
}

impl Default for MockEngineConfig {
    fn default() -> Self {
        Self {
            line_px_height: 40,
            max_input_horizontal_pixels: 2048,
            text: "mock text".to_owned(),
        }
    }
}

/// Mock recognition engine for testing.
///
/// Every page yields one line with the crop-local polygon
/// `[[0,0],[50,0],[50,10],[0,10]]`, so callers can check how results are
/// moved into image coordinates. Calls and batch shapes are recorded.
#[derive(Debug)]
pub struct MockEngine {
    config: MockEngineConfig,
    info: OcrEngineInfo,
    failing: bool,
    page_calls: AtomicUsize,
    batches: Mutex<Vec<(usize, Option<(u32, u32)>)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(MockEngineConfig::default())
    }
}

impl MockEngine {
    /// Creates a new mock engine with the given configuration.
    pub fn new(config: MockEngineConfig) -> Self {
        Self {
            config,
            info: OcrEngineInfo::new("mock", env!("CARGO_PKG_VERSION"), "mock-1"),
            failing: false,
            page_calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Makes every recognition call fail with an engine error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Crop-local polygon of the line returned for every page.
    pub fn line_polygon() -> Polygon {
        Polygon::rect(0.0, 0.0, 50.0, 10.0)
    }

    /// Number of page, layout and table calls so far.
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// Size and common `(width, height)` of every line batch received.
    pub fn batches(&self) -> Vec<(usize, Option<(u32, u32)>)> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(Error::engine().with_message("mock engine failure"));
        }
        Ok(())
    }
}

impl RecognitionEngine for MockEngine {
    fn info(&self) -> &OcrEngineInfo {
        &self.info
    }

    fn line_px_height(&self) -> u32 {
        self.config.line_px_height
    }

    fn max_input_horizontal_pixels(&self) -> u32 {
        self.config.max_input_horizontal_pixels
    }

    fn recognize_page(&self, _image: &RgbImage) -> Result<OcrPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let line = TextLine::new(self.config.text.clone(), 0.9, Self::line_polygon());
        Ok(OcrPage {
            image_bbox: Self::line_polygon().bbox(),
            text_lines: vec![line],
        })
    }

    fn recognize_lines(&self, batch: &NormalizedBatch) -> Result<Vec<LineRecognition>> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push((batch.len(), batch.dimensions()));
        }
        self.check()?;
        Ok(batch
            .entries
            .iter()
            .map(|entry| LineRecognition::new(format!("{} {}", self.config.text, entry.index), 0.8))
            .collect())
    }

    fn detect_layout(&self, image: &RgbImage) -> Result<LayoutPage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let polygon = Polygon::rect(0.0, 0.0, f64::from(image.width()), f64::from(image.height()));
        Ok(LayoutPage {
            image_bbox: polygon.bbox(),
            bboxes: vec![LayoutBox {
                label: "text".to_owned(),
                position: 0,
                confidence: 0.7,
                polygon,
            }],
            sliced: false,
        })
    }

    fn recognize_tables(&self, _image: &RgbImage) -> Result<TablePage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let polygon = Self::line_polygon();
        Ok(TablePage {
            image_bbox: polygon.bbox(),
            cells: vec![TableCell {
                row_id: 0,
                col_id: 0,
                text: Some(self.config.text.clone()),
                polygon: polygon.clone(),
            }],
            unmerged_cells: Vec::new(),
            rows: vec![TableRow {
                row_id: 0,
                polygon: polygon.clone(),
            }],
            cols: vec![TableCol { col_id: 0, polygon }],
        })
    }
}

/// Loader handing out one shared [`MockEngine`] and counting loads.
#[derive(Debug, Clone)]
pub struct MockEngineLoader {
    engine: Arc<MockEngine>,
    loads: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockEngineLoader {
    pub fn new(engine: MockEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            loads: Arc::default(),
        }
    }

    /// The engine returned by every load.
    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }

    /// Number of times `load` was called.
    pub fn loads(&self) -> usize {
        self.loads.lock().map(|loads| loads.len()).unwrap_or_default()
    }

    /// Directories passed to `load`, in call order.
    pub fn load_dirs(&self) -> Vec<PathBuf> {
        self.loads
            .lock()
            .map(|loads| loads.clone())
            .unwrap_or_default()
    }
}

impl Default for MockEngineLoader {
    fn default() -> Self {
        Self::new(MockEngine::default())
    }
}

impl EngineLoader for MockEngineLoader {
    fn load(&self, config_dir: &Path) -> Result<Arc<dyn RecognitionEngine>> {
        if let Ok(mut loads) = self.loads.lock() {
            loads.push(config_dir.to_path_buf());
        }
        Ok(self.engine.clone())
    }
}
