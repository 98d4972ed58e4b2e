//! Job body: download, crop, recognize, move back into image coordinates.
//!
//! Download and decode failures are part of the answer (`{"error": ...}`)
//! while engine failures are returned as errors and fail the job. Regions
//! that collapse to an empty box after rounding and clamping contribute an
//! empty line list.

use std::sync::Arc;

use image::{DynamicImage, RgbImage, imageops};
use ocrq_core::{
    Answer, Error, ImageSource, Job, JobArgs, LayoutPage, LineTranscription, Merge, Normalizer,
    OcrAnswer, OcrMode, OcrResult, PixelBox, Polygon, RecognitionEngine, Region,
    RegionTranscription, Result, Shift, TablePage, TaskKind, TextLine,
};
use serde::Serialize;
use serde_json::Value;

use crate::TRACING_TARGET_PIPELINE;
use crate::service::EngineCell;

/// Executes OCR jobs against an image source and a lazily loaded engine.
#[derive(Clone)]
pub struct OcrPipeline {
    engine: Arc<EngineCell>,
    source: Arc<dyn ImageSource>,
    pad_color: u8,
}

impl OcrPipeline {
    pub fn new(engine: Arc<EngineCell>, source: Arc<dyn ImageSource>) -> Self {
        Self {
            engine,
            source,
            pad_color: ocrq_core::normalize::DEFAULT_BACKGROUND,
        }
    }

    /// Sets the gray level used to pad line images.
    pub fn with_pad_color(mut self, pad_color: u8) -> Self {
        self.pad_color = pad_color;
        self
    }

    pub fn engine(&self) -> &Arc<EngineCell> {
        &self.engine
    }

    /// Runs `job` and returns its serialized answer.
    #[tracing::instrument(
        skip(self, job),
        fields(job_id = %job.id, task = %job.task, regions = job.args.regions.len()),
        target = TRACING_TARGET_PIPELINE
    )]
    pub async fn execute(&self, job: &Job) -> Result<Value> {
        let started = std::time::Instant::now();
        let value = match job.task {
            TaskKind::RunOcr => to_value(&self.run_ocr(&job.args).await?)?,
            TaskKind::RunLayout => to_value(&self.run_layout(&job.args).await?)?,
            TaskKind::RunTables => to_value(&self.run_tables(&job.args).await?)?,
        };

        tracing::info!(
            target: TRACING_TARGET_PIPELINE,
            elapsed_ms = started.elapsed().as_millis(),
            "Job executed"
        );
        Ok(value)
    }

    /// Transcribes every region of the image at `args.image_url`.
    pub async fn run_ocr(&self, args: &JobArgs) -> Result<OcrAnswer> {
        let image = match self.load_image(&args.image_url).await {
            Ok(image) => image,
            Err(error) => return Ok(input_failure(error)),
        };
        let engine = self.engine.get().await?;
        let regions = args.regions.clone();
        let mode = args.mode;
        let pad_color = self.pad_color;

        let result = run_blocking(move || {
            transcribe_regions(engine.as_ref(), &image, regions, mode, pad_color)
        })
        .await?;
        Ok(Answer::Result(result))
    }

    /// Detects layout blocks in every region and merges them into one page.
    pub async fn run_layout(&self, args: &JobArgs) -> Result<Answer<LayoutPage>> {
        let image = match self.load_image(&args.image_url).await {
            Ok(image) => image,
            Err(error) => return Ok(input_failure(error)),
        };
        let engine = self.engine.get().await?;
        let regions = args.regions.clone();

        let page = run_blocking(move || {
            analyze_regions(&image, &regions, |crop| engine.detect_layout(crop))
        })
        .await?;
        Ok(Answer::Result(page))
    }

    /// Recognizes tables in every region and merges them into one page.
    pub async fn run_tables(&self, args: &JobArgs) -> Result<Answer<TablePage>> {
        let image = match self.load_image(&args.image_url).await {
            Ok(image) => image,
            Err(error) => return Ok(input_failure(error)),
        };
        let engine = self.engine.get().await?;
        let regions = args.regions.clone();

        let page = run_blocking(move || {
            analyze_regions(&image, &regions, |crop| engine.recognize_tables(crop))
        })
        .await?;
        Ok(Answer::Result(page))
    }

    /// Downloads and decodes an image into 8-bit RGB.
    async fn load_image(&self, url: &str) -> Result<RgbImage> {
        let bytes = self.source.fetch(url).await?.validate(url)?;
        let url = url.to_owned();

        run_blocking(move || {
            let image = image::load_from_memory(&bytes).map_err(|e| {
                Error::decode_failure()
                    .with_message(format!("failed to decode image from {url}: {e}"))
                    .with_source(e)
            })?;
            tracing::debug!(
                target: TRACING_TARGET_PIPELINE,
                width = image.width(),
                height = image.height(),
                color = ?image.color(),
                "Image decoded"
            );
            // Grayscale and alpha images are broadcast to three channels.
            Ok(image.to_rgb8())
        })
        .await
    }
}

fn input_failure<T>(error: Error) -> Answer<T> {
    tracing::warn!(
        target: TRACING_TARGET_PIPELINE,
        kind = error.kind_str(),
        error = %error,
        "Image could not be loaded"
    );
    Answer::error(error.message_or_kind())
}

fn to_value<T: Serialize>(answer: &T) -> Result<Value> {
    Ok(serde_json::to_value(answer)?)
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        Error::engine()
            .with_message("recognition task did not complete")
            .with_source(e)
    })?
}

/// Pixel boxes of `regions` inside an image of the given size.
///
/// An empty region list selects the whole image.
fn pixel_boxes(regions: &[Region], width: u32, height: u32) -> Vec<PixelBox> {
    if regions.is_empty() {
        return vec![PixelBox::whole(width, height)];
    }
    regions
        .iter()
        .map(|region| PixelBox::from_region(region).clamp_to(width, height))
        .collect()
}

fn crop(image: &RgbImage, pixel_box: &PixelBox) -> RgbImage {
    imageops::crop_imm(
        image,
        pixel_box.xtl,
        pixel_box.ytl,
        pixel_box.width(),
        pixel_box.height(),
    )
    .to_image()
}

fn crop_rect(pixel_box: &PixelBox) -> Polygon {
    Polygon::rect(
        f64::from(pixel_box.xtl),
        f64::from(pixel_box.ytl),
        f64::from(pixel_box.xbr),
        f64::from(pixel_box.ybr),
    )
}

fn line_ids<I: IntoIterator<Item = TextLine>>(lines: I) -> Vec<LineTranscription> {
    lines
        .into_iter()
        .zip(0u32..)
        .map(|(line, line_id)| LineTranscription::from_text_line(line, line_id))
        .collect()
}

fn transcribe_regions(
    engine: &dyn RecognitionEngine,
    image: &RgbImage,
    regions: Vec<Region>,
    mode: OcrMode,
    pad_color: u8,
) -> Result<OcrResult> {
    let (width, height) = image.dimensions();
    let boxes = pixel_boxes(&regions, width, height);
    let regions = if regions.is_empty() {
        vec![Region::whole(width, height)]
    } else {
        regions
    };

    let transcriptions = match mode {
        OcrMode::Block => transcribe_blocks(engine, image, regions, &boxes)?,
        OcrMode::Line => transcribe_lines(engine, image, regions, &boxes, pad_color)?,
    };

    Ok(OcrResult {
        ocr_engine: engine.info().clone(),
        transcriptions,
    })
}

fn transcribe_blocks(
    engine: &dyn RecognitionEngine,
    image: &RgbImage,
    regions: Vec<Region>,
    boxes: &[PixelBox],
) -> Result<Vec<RegionTranscription>> {
    regions
        .into_iter()
        .zip(boxes)
        .map(|(region, pixel_box)| {
            if pixel_box.is_degenerate() {
                tracing::debug!(
                    target: TRACING_TARGET_PIPELINE,
                    region = ?region,
                    "Skipping empty region"
                );
                return Ok(RegionTranscription::empty(region));
            }

            let (dx, dy) = pixel_box.origin();
            let page = engine.recognize_page(&crop(image, pixel_box))?.shift(dx, dy);
            Ok(RegionTranscription {
                region,
                lines: line_ids(page.text_lines),
            })
        })
        .collect()
}

fn transcribe_lines(
    engine: &dyn RecognitionEngine,
    image: &RgbImage,
    regions: Vec<Region>,
    boxes: &[PixelBox],
    pad_color: u8,
) -> Result<Vec<RegionTranscription>> {
    let crops: Vec<(usize, DynamicImage)> = boxes
        .iter()
        .enumerate()
        .filter(|(_, pixel_box)| !pixel_box.is_degenerate())
        .map(|(index, pixel_box)| (index, DynamicImage::ImageRgb8(crop(image, pixel_box))))
        .collect();

    let batch = Normalizer::for_engine(engine)
        .with_background(pad_color)
        .normalize_batch(crops)?;

    let recognized = if batch.is_empty() {
        Vec::new()
    } else {
        engine.recognize_lines(&batch)?
    };
    if recognized.len() != batch.len() {
        return Err(Error::engine().with_message(format!(
            "engine returned {} lines for a batch of {}",
            recognized.len(),
            batch.len()
        )));
    }

    let mut lines: Vec<Option<TextLine>> = vec![None; regions.len()];
    for (entry, line) in batch.entries.iter().zip(recognized) {
        let polygon = crop_rect(&boxes[entry.index]);
        lines[entry.index] = Some(TextLine::new(line.text, line.confidence, polygon));
    }

    Ok(regions
        .into_iter()
        .zip(lines)
        .map(|(region, line)| RegionTranscription {
            region,
            lines: line_ids(line),
        })
        .collect())
}

fn analyze_regions<P, F>(image: &RgbImage, regions: &[Region], analyze: F) -> Result<P>
where
    P: Shift + Merge,
    F: Fn(&RgbImage) -> Result<P>,
{
    let (width, height) = image.dimensions();
    let pages = pixel_boxes(regions, width, height)
        .iter()
        .filter(|pixel_box| !pixel_box.is_degenerate())
        .map(|pixel_box| {
            let (dx, dy) = pixel_box.origin();
            Ok(analyze(&crop(image, pixel_box))?.shift(dx, dy))
        })
        .collect::<Result<Vec<P>>>()?;
    Ok(P::merge(pages))
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use ocrq_core::{BBox, ErrorKind, OcrEngineInfo};
    use ocrq_test::{MockEngine, MockEngineLoader, MockImageSource};
    use tempfile::TempDir;

    use super::*;

    const URL: &str = "http://images.test/page.png";

    struct Fixture {
        pipeline: OcrPipeline,
        loader: MockEngineLoader,
        _dir: TempDir,
    }

    fn fixture_with(source: MockImageSource, engine: MockEngine) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let loader = MockEngineLoader::new(engine);
        let cell = EngineCell::new(Arc::new(loader.clone()), dir.path());
        Fixture {
            pipeline: OcrPipeline::new(Arc::new(cell), Arc::new(source)),
            loader,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([255, 255, 255])));
        fixture_with(
            MockImageSource::new().with_image(URL, &page),
            MockEngine::default(),
        )
    }

    fn points(polygon: &Polygon) -> Vec<(f64, f64)> {
        polygon.points().iter().map(|p| (p[0], p[1])).collect()
    }

    #[tokio::test]
    async fn region_at_origin_keeps_local_polygon() {
        let fixture = fixture();
        let args = JobArgs::new(URL, vec![Region::new(0.0, 0.0, 100.0, 100.0)]);

        let answer = fixture.pipeline.run_ocr(&args).await.unwrap();
        let result = answer.result().unwrap();

        assert_eq!(result.transcriptions.len(), 1);
        let line = &result.transcriptions[0].lines[0];
        assert_eq!(line.polygon, MockEngine::line_polygon());
        assert_eq!(line.line_id, 0);
    }

    #[tokio::test]
    async fn offset_region_shifts_polygon() {
        let fixture = fixture();
        let args = JobArgs::new(URL, vec![Region::new(50.0, 50.0, 150.0, 150.0)]);

        let answer = fixture.pipeline.run_ocr(&args).await.unwrap();
        let line = &answer.result().unwrap().transcriptions[0].lines[0];

        assert_eq!(
            points(&line.polygon),
            vec![(50.0, 50.0), (100.0, 50.0), (100.0, 60.0), (50.0, 60.0)]
        );
    }

    #[tokio::test]
    async fn empty_regions_cover_whole_image() {
        let fixture = fixture();
        let answer = fixture
            .pipeline
            .run_ocr(&JobArgs::new(URL, Vec::new()))
            .await
            .unwrap();
        let result = answer.result().unwrap();

        assert_eq!(result.transcriptions.len(), 1);
        assert_eq!(result.transcriptions[0].region, Region::new(0.0, 0.0, 300.0, 200.0));
        assert_eq!(result.ocr_engine, OcrEngineInfo::new("mock", env!("CARGO_PKG_VERSION"), "mock-1"));
    }

    #[tokio::test]
    async fn degenerate_regions_yield_empty_lines_in_order() {
        let fixture = fixture();
        let regions = vec![
            Region::new(10.0, 10.0, 60.0, 60.0),
            Region::new(400.0, 400.0, 500.0, 500.0),
            Region::new(80.0, 80.0, 20.0, 20.0),
            Region::new(0.2, 0.2, 0.4, 0.4),
        ];
        let answer = fixture
            .pipeline
            .run_ocr(&JobArgs::new(URL, regions.clone()))
            .await
            .unwrap();
        let result = answer.result().unwrap();

        let returned: Vec<_> = result.transcriptions.iter().map(|t| t.region).collect();
        assert_eq!(returned, regions);
        assert_eq!(result.transcriptions[0].lines.len(), 1);
        assert!(result.transcriptions[1..].iter().all(|t| t.lines.is_empty()));
        assert_eq!(fixture.loader.engine().page_calls(), 1);
    }

    #[tokio::test]
    async fn line_mode_batches_all_regions() {
        let fixture = fixture();
        let regions = vec![
            Region::new(0.0, 0.0, 100.0, 20.0),
            Region::new(10.0, 30.0, 210.0, 60.0),
            Region::new(5.0, 5.0, 5.0, 5.0),
        ];
        let args = JobArgs::new(URL, regions).with_mode(OcrMode::Line);

        let answer = fixture.pipeline.run_ocr(&args).await.unwrap();
        let result = answer.result().unwrap();

        assert_eq!(fixture.loader.engine().batches().len(), 1);
        assert_eq!(fixture.loader.engine().batches()[0].0, 2);
        assert_eq!(fixture.loader.engine().page_calls(), 0);

        let second = &result.transcriptions[1].lines[0];
        assert_eq!(second.polygon, Polygon::rect(10.0, 30.0, 210.0, 60.0));
        assert_eq!(second.text, "mock text 1");
        assert!(result.transcriptions[2].lines.is_empty());
    }

    #[tokio::test]
    async fn download_failure_is_an_answer() {
        let fixture = fixture_with(MockImageSource::new(), MockEngine::default());
        let answer = fixture
            .pipeline
            .run_ocr(&JobArgs::new("http://images.test/missing.png", Vec::new()))
            .await
            .unwrap();

        let message = answer.error_message().unwrap();
        assert!(message.contains("status code 404"));
        assert_eq!(fixture.loader.loads(), 0);
    }

    #[tokio::test]
    async fn decode_failure_is_an_answer() {
        let source = MockImageSource::new().with_response(
            URL,
            200,
            Some("image/png"),
            bytes::Bytes::from_static(b"not a png"),
        );
        let fixture = fixture_with(source, MockEngine::default());
        let answer = fixture
            .pipeline
            .run_ocr(&JobArgs::new(URL, Vec::new()))
            .await
            .unwrap();
        assert!(answer.error_message().unwrap().contains("failed to decode"));
    }

    #[tokio::test]
    async fn engine_failure_fails_the_job() {
        let page = DynamicImage::new_rgb8(64, 64);
        let fixture = fixture_with(
            MockImageSource::new().with_image(URL, &page),
            MockEngine::default().failing(),
        );
        let error = fixture
            .pipeline
            .run_ocr(&JobArgs::new(URL, Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Engine);
    }

    #[tokio::test]
    async fn layout_pages_are_shifted_and_merged() {
        let fixture = fixture();
        let regions = vec![
            Region::new(0.0, 0.0, 100.0, 100.0),
            Region::new(150.0, 50.0, 250.0, 150.0),
        ];
        let answer = fixture
            .pipeline
            .run_layout(&JobArgs::new(URL, regions))
            .await
            .unwrap();
        let page = answer.result().unwrap();

        assert_eq!(page.bboxes.len(), 2);
        assert_eq!(page.bboxes[1].polygon, Polygon::rect(150.0, 50.0, 250.0, 150.0));
        assert_eq!(page.image_bbox, Some(BBox::new(0.0, 0.0, 250.0, 150.0)));
    }

    #[tokio::test]
    async fn execute_serializes_the_answer() {
        let fixture = fixture();
        let job = Job::new(TaskKind::RunTables, JobArgs::new(URL, Vec::new()));
        let value = fixture.pipeline.execute(&job).await.unwrap();
        assert_eq!(value["result"]["cells"][0]["text"], "mock text");
    }
}
