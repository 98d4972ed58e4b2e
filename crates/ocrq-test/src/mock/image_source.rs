//! In-memory image source.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use ocrq_core::{Error, FetchedImage, ImageSource, Result};

/// Encodes `image` as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Bytes {
    let mut buffer = Cursor::new(Vec::new());
    // Writing PNG into memory only fails for unsupported pixel layouts.
    if image.write_to(&mut buffer, ImageFormat::Png).is_err() {
        return Bytes::new();
    }
    Bytes::from(buffer.into_inner())
}

/// Image source serving canned responses by URL.
///
/// Unknown URLs answer with status 404.
#[derive(Debug, Default)]
pub struct MockImageSource {
    responses: HashMap<String, FetchedImage>,
    unreachable: Vec<String>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `image` as a PNG at `url`.
    #[must_use]
    pub fn with_image(self, url: &str, image: &DynamicImage) -> Self {
        self.with_response(url, 200, Some("image/png"), encode_png(image))
    }

    /// Serves a raw response at `url`.
    #[must_use]
    pub fn with_response(
        mut self,
        url: &str,
        status: u16,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> Self {
        self.responses.insert(
            url.to_owned(),
            FetchedImage {
                status,
                content_type: content_type.map(str::to_owned),
                bytes,
            },
        );
        self
    }

    /// Makes fetching `url` fail at the transport level.
    #[must_use]
    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.push(url.to_owned());
        self
    }

    /// Makes every fetch take `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.iter().any(|u| u == url) {
            return Err(Error::download_failure()
                .with_message(format!("failed to download image from {url}: connection refused")));
        }
        Ok(self.responses.get(url).cloned().unwrap_or(FetchedImage {
            status: 404,
            content_type: None,
            bytes: Bytes::new(),
        }))
    }
}
