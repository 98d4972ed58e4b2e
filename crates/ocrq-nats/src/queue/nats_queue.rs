//! `JobQueue` implementation over the job stream and record bucket.

use async_trait::async_trait;
use ocrq_core::{Job, JobArgs, JobId, JobQueue, JobState, TaskKind};

use super::{JobRecord, JobRecords, JobStream, Transition};
use crate::{Error, TRACING_TARGET_QUEUE};

/// Submitting side of a job queue, used by the proxy.
#[derive(Clone)]
pub struct NatsJobQueue {
    stream: JobStream,
    records: JobRecords,
}

impl NatsJobQueue {
    pub(crate) fn new(stream: JobStream, records: JobRecords) -> Self {
        Self { stream, records }
    }

    pub fn stream(&self) -> &JobStream {
        &self.stream
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn submit(&self, task: TaskKind, args: JobArgs) -> ocrq_core::Result<JobId> {
        let job = Job::new(task, args);
        let id = job.id;

        // The record goes first so a poll never observes a missing job.
        self.records.insert(&JobRecord::queued(job.clone())).await?;

        if let Err(e) = self.stream.publish(&job).await {
            if let Err(cleanup) = self.records.remove(&id).await {
                tracing::warn!(
                    target: TRACING_TARGET_QUEUE,
                    job_id = %id,
                    error = %cleanup,
                    "Failed to remove record of unpublished job"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            target: TRACING_TARGET_QUEUE,
            job_id = %id,
            task = %task,
            "Job submitted"
        );
        Ok(id)
    }

    async fn state(&self, id: &JobId) -> ocrq_core::Result<JobState> {
        Ok(self.records.get(id).await?.state)
    }

    async fn fetch_result(&self, id: &JobId) -> ocrq_core::Result<serde_json::Value> {
        let record = self.records.get(id).await?;
        match (record.state, record.result) {
            (JobState::Succeeded, Some(result)) => Ok(result),
            (state, _) => Err(Error::operation(
                "job_fetch_result",
                format!("job {id} has no result in state {state:?}"),
            )
            .into()),
        }
    }

    async fn cancel(&self, id: &JobId, terminate: bool) -> ocrq_core::Result<()> {
        let transition = self
            .records
            .transition(id, |record| record.cancel(terminate))
            .await?;

        match transition {
            Transition::Applied(_) => tracing::info!(
                target: TRACING_TARGET_QUEUE,
                job_id = %id,
                terminate,
                "Job cancelled"
            ),
            Transition::Rejected(record) => tracing::debug!(
                target: TRACING_TARGET_QUEUE,
                job_id = %id,
                state = ?record.state,
                "Job already finished, cancel ignored"
            ),
        }
        Ok(())
    }
}
