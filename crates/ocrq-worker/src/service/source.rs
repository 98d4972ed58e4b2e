//! HTTP image download.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ocrq_core::{Error, FetchedImage, ImageSource};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use super::config::DEFAULT_DOWNLOAD_TIMEOUT_SECS;
use crate::{Result, TRACING_TARGET_PIPELINE, WorkerError};

/// Default timeout of one image download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS);

struct HttpImageSourceInner {
    http: Client,
    timeout: Duration,
}

/// [`ImageSource`] backed by a shared `reqwest` client.
///
/// The timeout bounds the whole download, body included.
#[derive(Clone)]
pub struct HttpImageSource {
    inner: Arc<HttpImageSourceInner>,
}

impl HttpImageSource {
    /// Creates a source with the given download timeout (zero selects the default).
    pub fn new(timeout: Duration) -> Result<Self> {
        let timeout = effective_timeout(timeout);
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("ocrq/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::processing_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            inner: Arc::new(HttpImageSourceInner { http, timeout }),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }
}

fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_DOWNLOAD_TIMEOUT
    } else {
        timeout
    }
}

fn download_error(url: &str, error: reqwest::Error) -> Error {
    let reason = if error.is_timeout() {
        "timed out".to_owned()
    } else {
        error.to_string()
    };
    Error::download_failure()
        .with_message(format!("failed to download image from {url}: {reason}"))
        .with_source(error)
}

#[async_trait]
impl ImageSource for HttpImageSource {
    #[tracing::instrument(skip(self), target = TRACING_TARGET_PIPELINE)]
    async fn fetch(&self, url: &str) -> ocrq_core::Result<FetchedImage> {
        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        // The body of a failed response is never used.
        let bytes = if status == 200 {
            response.bytes().await.map_err(|e| download_error(url, e))?
        } else {
            Bytes::new()
        };

        tracing::debug!(
            target: TRACING_TARGET_PIPELINE,
            status,
            content_type = content_type.as_deref().unwrap_or_default(),
            size = bytes.len(),
            "Image downloaded"
        );

        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}

impl fmt::Debug for HttpImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpImageSource")
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_uses_default() {
        let source = HttpImageSource::new(Duration::ZERO).unwrap();
        assert_eq!(source.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn keeps_explicit_timeout() {
        let source = HttpImageSource::new(Duration::from_secs(3)).unwrap();
        assert_eq!(source.timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_download_failure() {
        let source = HttpImageSource::new(Duration::from_secs(2)).unwrap();
        let error = source.fetch("http://127.0.0.1:9/a.png").await.unwrap_err();
        assert_eq!(error.kind(), ocrq_core::ErrorKind::DownloadFailure);
        assert!(error.to_string().contains("http://127.0.0.1:9/a.png"));
    }
}
