//! Error types and utilities for NATS operations.

use std::time::Duration;

/// Result type for all NATS operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for NATS operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// NATS client/connection errors
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::Error),

    /// Serialization errors when sending or receiving messages
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timeout
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// No record exists for the job
    #[error("Job '{id}' not found")]
    JobNotFound { id: String },

    /// KV revision mismatch (optimistic concurrency failure)
    #[error("Revision mismatch for key '{key}'")]
    KvRevisionMismatch { key: String },

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Generic operation error with context
    #[error("NATS operation failed: {operation} - {details}")]
    Operation { operation: String, details: String },
}

impl Error {
    /// Create an operation error with context
    pub fn operation(op: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Operation {
            operation: op.into(),
            details: details.into(),
        }
    }

    /// Create a job not found error
    pub fn job_not_found(id: impl ToString) -> Self {
        Self::JobNotFound { id: id.to_string() }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a timeout error with the given duration
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { timeout: duration }
    }

    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout { .. } | Error::KvRevisionMismatch { .. }
        )
    }
}

impl From<Error> for ocrq_core::Error {
    fn from(error: Error) -> Self {
        let core = match &error {
            Error::Serialization(_) => ocrq_core::Error::serialization(),
            Error::InvalidConfig { .. } => ocrq_core::Error::configuration(),
            _ => ocrq_core::Error::queue(),
        };
        core.with_message(error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use ocrq_core::ErrorKind;

    use super::*;

    #[test]
    fn converts_into_core_kinds() {
        let core: ocrq_core::Error = Error::job_not_found("abc").into();
        assert_eq!(core.kind(), ErrorKind::Queue);
        assert!(core.to_string().contains("abc"));

        let core: ocrq_core::Error = Error::invalid_config("no url").into();
        assert_eq!(core.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn retryable_errors() {
        assert!(Error::timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::operation("kv_put", "denied").is_retryable());
    }
}
