//! Job records and their state transitions.

use jiff::Timestamp;
use ocrq_core::{Job, JobId, JobState};
use serde::{Deserialize, Serialize};

use crate::kv::{JobKey, JobsBucket, KvStore};
use crate::{Error, Result, TRACING_TARGET_QUEUE};

/// Attempts made before giving up on a contended record.
const MAX_TRANSITION_ATTEMPTS: usize = 5;

/// Stored state of a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: Job,
    pub state: JobState,
    /// Answer produced by the worker, present once succeeded.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Creates the record of a freshly queued job.
    pub fn queued(job: Job) -> Self {
        Self {
            job,
            state: JobState::Queued,
            result: None,
            updated_at: Timestamp::now(),
        }
    }

    fn with_state(&self, state: JobState) -> Self {
        Self {
            job: self.job.clone(),
            state,
            result: None,
            updated_at: Timestamp::now(),
        }
    }

    /// `Queued -> Running`, or a redelivered `Running` taken over by `worker`.
    pub fn start(&self, worker: &str, attempt: u64) -> Option<Self> {
        self.state
            .started(worker, attempt)
            .map(|state| self.with_state(state))
    }

    /// `Running -> Succeeded`, storing the answer.
    pub fn succeed(&self, result: serde_json::Value) -> Option<Self> {
        self.state.succeeded().map(|state| {
            let mut record = self.with_state(state);
            record.result = Some(result);
            record
        })
    }

    /// `Queued | Running -> Failed`.
    pub fn fail(&self, reason: &str) -> Option<Self> {
        self.state.failed(reason).map(|state| self.with_state(state))
    }

    /// `Queued | Running -> Cancelled`.
    pub fn cancel(&self, terminate: bool) -> Option<Self> {
        self.state
            .cancelled(terminate)
            .map(|state| self.with_state(state))
    }
}

/// Outcome of [`JobRecords::transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The new record was written.
    Applied(JobRecord),
    /// The current record does not allow the transition; it is left as is.
    Rejected(JobRecord),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn record(&self) -> &JobRecord {
        match self {
            Self::Applied(record) | Self::Rejected(record) => record,
        }
    }
}

/// Job records stored in the jobs KV bucket.
#[derive(Clone)]
pub struct JobRecords {
    store: KvStore<JobKey, JobRecord, JobsBucket>,
}

impl JobRecords {
    pub fn new(store: KvStore<JobKey, JobRecord, JobsBucket>) -> Self {
        Self { store }
    }

    /// Writes the initial record of `job`.
    pub async fn insert(&self, record: &JobRecord) -> Result<()> {
        self.store.put(&JobKey(record.job.id), record).await?;
        Ok(())
    }

    /// Returns the record of `id`, failing if none exists.
    pub async fn get(&self, id: &JobId) -> Result<JobRecord> {
        self.store
            .get_value(&JobKey(*id))
            .await?
            .ok_or_else(|| Error::job_not_found(id))
    }

    pub async fn remove(&self, id: &JobId) -> Result<()> {
        self.store.delete(&JobKey(*id)).await
    }

    /// Applies `step` to the current record with compare-and-set, retrying
    /// when another writer raced in between.
    pub async fn transition<F>(&self, id: &JobId, step: F) -> Result<Transition>
    where
        F: Fn(&JobRecord) -> Option<JobRecord>,
    {
        let key = JobKey(*id);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let current = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| Error::job_not_found(id))?;

            let Some(next) = step(&current.value) else {
                return Ok(Transition::Rejected(current.value));
            };

            match self.store.update(&key, &next, current.revision).await {
                Ok(_) => {
                    tracing::debug!(
                        target: TRACING_TARGET_QUEUE,
                        job_id = %id,
                        state = ?next.state,
                        "Job record updated"
                    );
                    return Ok(Transition::Applied(next));
                }
                Err(Error::KvRevisionMismatch { .. }) if attempt < MAX_TRANSITION_ATTEMPTS => {
                    tracing::debug!(
                        target: TRACING_TARGET_QUEUE,
                        job_id = %id,
                        attempt,
                        "Job record changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
