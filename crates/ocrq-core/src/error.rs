//! Common error type definitions.

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
///
/// Used as the source slot of [`Error`] so that transport and decoder errors
/// can be attached without leaking their concrete types.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors that can occur in ocrq operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed URL or region list, rejected before any job is created.
    InvalidInput,
    /// The image could not be downloaded (status, content type, empty body).
    DownloadFailure,
    /// The downloaded bytes are not a readable image.
    DecodeFailure,
    /// A region does not describe a usable rectangle.
    InvalidGeometry,
    /// Crops in one batch do not share a channel count.
    ChannelMismatch,
    /// The worker reported the job as failed.
    JobFailed,
    /// No terminal job state was observed before the deadline.
    Timeout,
    /// The job queue transport failed.
    Queue,
    /// The recognition engine failed or could not be initialized.
    Engine,
    /// The operation is not supported by this implementation.
    Unsupported,
    /// Configuration error.
    Configuration,
    /// Serialization/deserialization error.
    Serialization,
}

impl ErrorKind {
    /// Returns the snake_case name of this kind.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A structured error type for ocrq operations.
#[derive(Debug, Error)]
#[error("{}{}", .kind.as_str(), .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a new invalid input error.
    pub fn invalid_input() -> Self {
        Self::new(ErrorKind::InvalidInput)
    }

    /// Creates a new download failure error.
    pub fn download_failure() -> Self {
        Self::new(ErrorKind::DownloadFailure)
    }

    /// Creates a new decode failure error.
    pub fn decode_failure() -> Self {
        Self::new(ErrorKind::DecodeFailure)
    }

    /// Creates a new invalid geometry error.
    pub fn invalid_geometry() -> Self {
        Self::new(ErrorKind::InvalidGeometry)
    }

    /// Creates a new channel mismatch error.
    pub fn channel_mismatch() -> Self {
        Self::new(ErrorKind::ChannelMismatch)
    }

    /// Creates a new job failed error.
    pub fn job_failed() -> Self {
        Self::new(ErrorKind::JobFailed)
    }

    /// Creates a new timeout error.
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    /// Creates a new queue error.
    pub fn queue() -> Self {
        Self::new(ErrorKind::Queue)
    }

    /// Creates a new engine error.
    pub fn engine() -> Self {
        Self::new(ErrorKind::Engine)
    }

    /// Creates a new unsupported operation error.
    pub fn unsupported() -> Self {
        Self::new(ErrorKind::Unsupported)
    }

    /// Creates a new configuration error.
    pub fn configuration() -> Self {
        Self::new(ErrorKind::Configuration)
    }

    /// Creates a new serialization error.
    pub fn serialization() -> Self {
        Self::new(ErrorKind::Serialization)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Returns the message, falling back to the kind name.
    pub fn message_or_kind(&self) -> &str {
        self.message.as_deref().unwrap_or(self.kind.as_str())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization()
            .with_message(error.to_string())
            .with_source(error)
    }
}
