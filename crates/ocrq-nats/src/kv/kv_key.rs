//! Key-value key types and traits.

use std::fmt;
use std::str::FromStr;

use ocrq_core::JobId;

use crate::Error;

/// Marker trait for KV key types.
///
/// Keys are stored in their `Display` form and parsed back with `FromStr`.
pub trait KvKey: fmt::Debug + fmt::Display + FromStr + Clone + Send + Sync + 'static {}

/// Key of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey(pub JobId);

impl KvKey for JobKey {}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job.{}", self.0)
    }
}

impl FromStr for JobKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix("job.")
            .ok_or_else(|| Error::operation("parse_job_key", format!("missing prefix: {s}")))?;
        let id = id
            .parse()
            .map_err(|e: ocrq_core::Error| Error::operation("parse_job_key", e.to_string()))?;
        Ok(Self(id))
    }
}

impl From<JobId> for JobKey {
    fn from(id: JobId) -> Self {
        Self(id)
    }
}
