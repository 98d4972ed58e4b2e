//! Key-value bucket configuration traits.

use std::time::Duration;

/// Marker trait for KV bucket configuration.
pub trait KvBucket: Clone + Send + Sync + 'static {
    /// Bucket name used in NATS KV.
    const NAME: &'static str;

    /// Human-readable description for the bucket.
    const DESCRIPTION: &'static str;

    /// Default TTL for entries in this bucket.
    /// Returns `None` for buckets where entries should not expire.
    const TTL: Option<Duration>;
}

/// Bucket holding the state and result of every submitted job.
///
/// Records only need to outlive the longest proxy deadline; the hour of
/// slack leaves room for late polls and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JobsBucket;

impl KvBucket for JobsBucket {
    const NAME: &'static str = "ocrq_jobs";
    const DESCRIPTION: &'static str = "OCR job states and results";
    const TTL: Option<Duration> = Some(Duration::from_secs(60 * 60));
}
