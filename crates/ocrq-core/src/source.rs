//! Image download capability.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{Error, Result};

/// Content types accepted for download, compared without parameters.
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/tiff",
    "image/bmp",
    "image/gif",
];

/// Raw response of an image download.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FetchedImage {
    /// Returns the media type with parameters (`; charset=...`) stripped.
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Checks status, content type and body, returning the body on success.
    pub fn validate(self, url: &str) -> Result<Bytes> {
        if self.status != 200 {
            return Err(Error::download_failure().with_message(format!(
                "failed to download image from {url}: status code {}",
                self.status
            )));
        }

        let media_type = self.media_type();
        match media_type.as_deref() {
            Some(media_type) if ACCEPTED_CONTENT_TYPES.contains(&media_type) => {}
            other => {
                return Err(Error::download_failure().with_message(format!(
                    "unsupported content type for {url}: {}",
                    other.unwrap_or("<missing>")
                )));
            }
        }

        if self.bytes.is_empty() {
            return Err(Error::download_failure()
                .with_message(format!("empty image downloaded from {url}")));
        }

        Ok(self.bytes)
    }
}

/// Fetches images by URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Downloads `url`. Transport failures are errors; HTTP statuses are not.
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn fetched(status: u16, content_type: Option<&str>, body: &'static [u8]) -> FetchedImage {
        FetchedImage {
            status,
            content_type: content_type.map(str::to_owned),
            bytes: Bytes::from_static(body),
        }
    }

    #[test]
    fn accepts_whitelisted_types_with_parameters() {
        let image = fetched(200, Some("Image/PNG; charset=binary"), b"png");
        assert_eq!(image.media_type().as_deref(), Some("image/png"));
        assert_eq!(image.validate("u").unwrap(), Bytes::from_static(b"png"));
    }

    #[test]
    fn rejects_bad_status() {
        let error = fetched(404, Some("image/png"), b"x").validate("u").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DownloadFailure);
        assert!(error.to_string().contains("404"));
    }

    #[test]
    fn rejects_unlisted_or_missing_type() {
        assert!(fetched(200, Some("text/html"), b"x").validate("u").is_err());
        assert!(fetched(200, Some("image/svg+xml"), b"x").validate("u").is_err());
        assert!(fetched(200, None, b"x").validate("u").is_err());
    }

    #[test]
    fn rejects_empty_body() {
        assert!(fetched(200, Some("image/jpeg"), b"").validate("u").is_err());
    }
}
