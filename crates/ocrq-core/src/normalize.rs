//! Batch shape unification for line recognition.
//!
//! A recognizer consuming batches needs every input to share one shape. The
//! [`Normalizer`] plans a target shape for each crop (only ever shrinking)
//! and then pads every crop on the right and bottom to a common
//! `target_height x batch_width` canvas.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Pixel};

use crate::engine::RecognitionEngine;
use crate::{Error, Result, TRACING_TARGET_NORMALIZE};

/// Default padding value (white).
pub const DEFAULT_BACKGROUND: u8 = 255;

/// Planned size of one crop after resizing, before padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetShape {
    pub height: u32,
    pub width: u32,
    /// Source height is below half the target height.
    pub small: bool,
    /// Source width is below the target height.
    pub thin: bool,
}

/// One normalized image, tagged with its position in the original crop list.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub index: usize,
    pub image: DynamicImage,
}

/// Same-shape images ready for a single batched recognition call.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub entries: Vec<BatchEntry>,
}

impl NormalizedBatch {
    /// Returns the number of images in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the batch holds no images.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the normalized images in batch order.
    pub fn images(&self) -> impl Iterator<Item = &DynamicImage> {
        self.entries.iter().map(|entry| &entry.image)
    }

    /// Returns the common `(width, height)` of the batch, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.entries
            .first()
            .map(|entry| (entry.image.width(), entry.image.height()))
    }
}

/// Resizes and pads crops to the shape expected by a line recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    target_height: u32,
    max_width: u32,
    background: u8,
}

impl Normalizer {
    /// Creates a normalizer with a white background.
    pub fn new(target_height: u32, max_width: u32) -> Self {
        Self {
            target_height: target_height.max(1),
            max_width: max_width.max(1),
            background: DEFAULT_BACKGROUND,
        }
    }

    /// Creates a normalizer matching the input geometry declared by `engine`.
    pub fn for_engine(engine: &dyn RecognitionEngine) -> Self {
        Self::new(engine.line_px_height(), engine.max_input_horizontal_pixels())
    }

    /// Sets the value written into padded pixels of every channel.
    #[must_use]
    pub fn with_background(mut self, background: u8) -> Self {
        self.background = background;
        self
    }

    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    /// Plans the resized shape of every `(height, width)` input.
    ///
    /// Inputs taller than the target are scaled down to the target height.
    /// If the resulting width still exceeds the maximum, the scale is
    /// re-derived from the maximum width, which then wins.
    pub fn plan(&self, shapes: &[(u32, u32)]) -> Vec<TargetShape> {
        shapes
            .iter()
            .enumerate()
            .map(|(index, &(height, width))| self.plan_one(index, height, width))
            .collect()
    }

    fn plan_one(&self, index: usize, height: u32, width: u32) -> TargetShape {
        let target = self.target_height;
        let (mut new_height, mut new_width) = (height, width);

        if new_height > target {
            new_height = target;
            new_width = scale(width, target, height);
        }

        if new_width > self.max_width {
            tracing::warn!(
                target: TRACING_TARGET_NORMALIZE,
                index,
                width = new_width,
                max_width = self.max_width,
                "large image, width after resize exceeds the maximum"
            );
            new_width = self.max_width;
            new_height = scale(height, self.max_width, width);
        }

        let small = f64::from(height) < f64::from(target) / 2.0;
        if small {
            tracing::warn!(
                target: TRACING_TARGET_NORMALIZE,
                index,
                height,
                target_height = target,
                "small image, height is below half the target height"
            );
        }

        let thin = width < target;
        if thin {
            tracing::warn!(
                target: TRACING_TARGET_NORMALIZE,
                index,
                width,
                target_height = target,
                "thin image, width is below the target height"
            );
        }

        TargetShape {
            height: new_height.max(1),
            width: new_width.max(1),
            small,
            thin,
        }
    }

    /// Normalizes `images` to one common shape, preserving order.
    ///
    /// All inputs must share a channel count. Empty input yields empty output.
    pub fn normalize(&self, images: &[DynamicImage]) -> Result<Vec<DynamicImage>> {
        let Some(first) = images.first() else {
            return Ok(Vec::new());
        };

        let channels = first.color().channel_count();
        if let Some((index, image)) = images
            .iter()
            .enumerate()
            .find(|(_, image)| image.color().channel_count() != channels)
        {
            return Err(Error::channel_mismatch().with_message(format!(
                "image #{index} has {} channels, expected {channels}",
                image.color().channel_count()
            )));
        }

        let shapes: Vec<(u32, u32)> = images
            .iter()
            .map(|image| (image.height(), image.width()))
            .collect();
        let plan = self.plan(&shapes);
        let batch_width = plan.iter().map(|shape| shape.width).max().unwrap_or(1);

        tracing::debug!(
            target: TRACING_TARGET_NORMALIZE,
            count = images.len(),
            channels,
            batch_width,
            target_height = self.target_height,
            "normalizing batch"
        );

        Ok(images
            .iter()
            .zip(&plan)
            .map(|(image, shape)| self.fit(image, shape, batch_width))
            .collect())
    }

    /// Normalizes index-tagged crops into a [`NormalizedBatch`].
    pub fn normalize_batch(&self, crops: Vec<(usize, DynamicImage)>) -> Result<NormalizedBatch> {
        let (indices, images): (Vec<_>, Vec<_>) = crops.into_iter().unzip();
        let normalized = self.normalize(&images)?;

        Ok(NormalizedBatch {
            entries: indices
                .into_iter()
                .zip(normalized)
                .map(|(index, image)| BatchEntry { index, image })
                .collect(),
        })
    }

    fn fit(&self, image: &DynamicImage, shape: &TargetShape, batch_width: u32) -> DynamicImage {
        let resized;
        let source = if (image.width(), image.height()) != (shape.width, shape.height) {
            resized = image.resize_exact(shape.width, shape.height, FilterType::Triangle);
            &resized
        } else {
            image
        };

        if (source.width(), source.height()) == (batch_width, self.target_height) {
            return source.clone();
        }

        let (width, height, background) = (batch_width, self.target_height, self.background);
        match source {
            DynamicImage::ImageLuma8(buffer) => pad(buffer, width, height, background).into(),
            DynamicImage::ImageLumaA8(buffer) => pad(buffer, width, height, background).into(),
            DynamicImage::ImageRgb8(buffer) => pad(buffer, width, height, background).into(),
            DynamicImage::ImageRgba8(buffer) => pad(buffer, width, height, background).into(),
            other => match other.color().channel_count() {
                1 => pad(&other.to_luma8(), width, height, background).into(),
                2 => pad(&other.to_luma_alpha8(), width, height, background).into(),
                3 => pad(&other.to_rgb8(), width, height, background).into(),
                _ => pad(&other.to_rgba8(), width, height, background).into(),
            },
        }
    }
}

/// `floor(value * numerator / denominator)`, the integer truncation used
/// when deriving the second dimension.
fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return value;
    }
    (u64::from(value) * u64::from(numerator) / u64::from(denominator)) as u32
}

/// Copies `image` into the top-left corner of a `width x height` canvas
/// filled with `background`. Padding is opaque.
fn pad<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    width: u32,
    height: u32,
    background: u8,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let count = usize::from(P::CHANNEL_COUNT);
    let mut channels = [background; 4];
    if P::HAS_ALPHA {
        channels[count - 1] = u8::MAX;
    }
    let fill = *P::from_slice(&channels[..count]);
    let mut canvas = ImageBuffer::from_pixel(width, height, fill);
    imageops::replace(&mut canvas, image, 0, 0);
    canvas
}

#[cfg(test)]
mod tests {
    use image::{GrayAlphaImage, GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;
    use crate::ErrorKind;

    fn rgb(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])))
    }

    #[test]
    fn plan_keeps_short_images_and_scales_tall_ones() {
        let normalizer = Normalizer::new(100, 300);
        let plan = normalizer.plan(&[(100, 50), (200, 400)]);

        assert_eq!((plan[0].height, plan[0].width), (100, 50));
        assert!(plan[0].thin);
        assert!(!plan[0].small);
        assert_eq!((plan[1].height, plan[1].width), (100, 200));
        assert!(!plan[1].thin);
    }

    #[test]
    fn plan_width_wins_when_both_limits_are_exceeded() {
        let normalizer = Normalizer::new(100, 300);
        let plan = normalizer.plan(&[(200, 800)]);
        assert_eq!((plan[0].height, plan[0].width), (75, 300));
    }

    #[test]
    fn plan_flags_small_images() {
        let plan = Normalizer::new(100, 300).plan(&[(40, 250)]);
        assert!(plan[0].small);
        assert_eq!((plan[0].height, plan[0].width), (40, 250));
    }

    #[test]
    fn normalize_pads_to_common_shape() {
        let normalizer = Normalizer::new(100, 300);
        let out = normalizer.normalize(&[rgb(50, 100), rgb(400, 200)]).unwrap();

        assert_eq!(out.len(), 2);
        for image in &out {
            assert_eq!((image.width(), image.height()), (200, 100));
            assert_eq!(image.color().channel_count(), 3);
        }

        let first = out[0].to_rgb8();
        assert_eq!(first.get_pixel(10, 10), &Rgb([10, 20, 30]));
        assert_eq!(first.get_pixel(150, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn normalize_pads_bottom_with_background() {
        let normalizer = Normalizer::new(100, 300).with_background(0);
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 60, Luma([200])));
        let out = normalizer.normalize(&[gray]).unwrap();

        let buffer = out[0].to_luma8();
        assert_eq!(buffer.dimensions(), (120, 100));
        assert_eq!(buffer.get_pixel(5, 5), &Luma([200]));
        assert_eq!(buffer.get_pixel(5, 80), &Luma([0]));
    }

    #[test]
    fn padding_is_opaque() {
        let normalizer = Normalizer::new(100, 300).with_background(0);
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(120, 60, Rgba([9, 9, 9, 40])));
        let out = normalizer.normalize(&[rgba]).unwrap();

        let buffer = out[0].to_rgba8();
        assert_eq!(buffer.get_pixel(5, 5), &Rgba([9, 9, 9, 40]));
        assert_eq!(buffer.get_pixel(5, 80), &Rgba([0, 0, 0, 255]));

        let gray = DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(120, 60, LumaA([7, 0])));
        let out = normalizer.normalize(&[gray]).unwrap();
        assert_eq!(out[0].to_luma_alpha8().get_pixel(5, 80), &LumaA([0, 255]));
    }

    #[test]
    fn normalize_rejects_mixed_channels() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let error = Normalizer::new(100, 300)
            .normalize(&[rgb(10, 10), gray])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ChannelMismatch);
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert!(Normalizer::new(100, 300).normalize(&[]).unwrap().is_empty());
    }

    #[test]
    fn normalize_batch_keeps_indices() {
        let batch = Normalizer::new(32, 256)
            .normalize_batch(vec![(2, rgb(40, 32)), (5, rgb(80, 64))])
            .unwrap();

        let indices: Vec<_> = batch.entries.iter().map(|entry| entry.index).collect();
        assert_eq!(indices, vec![2, 5]);
        assert_eq!(batch.dimensions(), Some((40, 32)));
    }
}
