//! Worker side of the job queue.

use async_nats::jetstream::{self, consumer};
use async_trait::async_trait;
use futures::StreamExt;
use ocrq_core::{Job, JobConsumer, JobDelivery, JobId};

use super::{JobRecords, JobStream, Transition};
use crate::{Error, TRACING_TARGET_QUEUE};

/// Pull consumer plus record updates for one worker process.
pub struct NatsJobConsumer {
    consumer: consumer::PullConsumer,
    records: JobRecords,
    worker: String,
}

impl NatsJobConsumer {
    pub(crate) async fn new(
        stream: &JobStream,
        records: JobRecords,
        worker: &str,
    ) -> crate::Result<Self> {
        Ok(Self {
            consumer: stream.consumer().await?,
            records,
            worker: worker.to_owned(),
        })
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

/// Delivery count of `message`, 1 when the broker did not report one.
fn delivery_attempt(message: &jetstream::Message) -> u64 {
    message
        .info()
        .ok()
        .and_then(|info| u64::try_from(info.delivered).ok())
        .unwrap_or(1)
}

#[async_trait]
impl JobConsumer for NatsJobConsumer {
    type Message = jetstream::Message;

    /// Fetches the next job without waiting.
    ///
    /// Messages that do not decode as a job are acknowledged and dropped.
    #[tracing::instrument(skip(self), fields(worker = %self.worker), target = TRACING_TARGET_QUEUE)]
    async fn next_job(&self) -> ocrq_core::Result<Option<JobDelivery<Self::Message>>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(1)
            .messages()
            .await
            .map_err(|e| Error::operation("job_fetch", e.to_string()))?;

        let message = match messages.next().await {
            None => return Ok(None),
            Some(Err(e)) => return Err(Error::operation("job_fetch", e.to_string()).into()),
            Some(Ok(message)) => message,
        };

        match serde_json::from_slice::<Job>(&message.payload) {
            Ok(job) => {
                let attempt = delivery_attempt(&message);
                tracing::debug!(
                    target: TRACING_TARGET_QUEUE,
                    job_id = %job.id,
                    task = %job.task,
                    attempt,
                    "Received job"
                );
                Ok(Some(JobDelivery {
                    job,
                    attempt,
                    message,
                }))
            }
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET_QUEUE,
                    error = %e,
                    subject = %message.subject,
                    "Failed to deserialize job, dropping message"
                );
                message.ack().await.ok();
                Ok(None)
            }
        }
    }

    /// Marks the job as running on this worker.
    ///
    /// Returns `false` when the job was cancelled before it started, is
    /// already taken by a first delivery elsewhere, or has no record.
    async fn start(&self, delivery: &JobDelivery<Self::Message>) -> ocrq_core::Result<bool> {
        let id = delivery.id();
        let transition = match self
            .records
            .transition(id, |record| record.start(&self.worker, delivery.attempt))
            .await
        {
            Ok(transition) => transition,
            Err(Error::JobNotFound { .. }) => {
                tracing::warn!(
                    target: TRACING_TARGET_QUEUE,
                    job_id = %id,
                    "Skipping job without a record"
                );
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        match &transition {
            Transition::Applied(_) if delivery.is_redelivery() => tracing::info!(
                target: TRACING_TARGET_QUEUE,
                job_id = %id,
                attempt = delivery.attempt,
                "Resuming redelivered job"
            ),
            Transition::Applied(_) => {}
            Transition::Rejected(record) => tracing::info!(
                target: TRACING_TARGET_QUEUE,
                job_id = %id,
                state = ?record.state,
                "Skipping job"
            ),
        }
        Ok(transition.is_applied())
    }

    async fn complete(&self, id: &JobId, result: serde_json::Value) -> ocrq_core::Result<bool> {
        let transition = self
            .records
            .transition(id, |record| record.succeed(result.clone()))
            .await?;
        Ok(transition.is_applied())
    }

    async fn fail(&self, id: &JobId, reason: &str) -> ocrq_core::Result<bool> {
        let transition = self
            .records
            .transition(id, |record| record.fail(reason))
            .await?;
        Ok(transition.is_applied())
    }

    async fn is_terminated(&self, id: &JobId) -> ocrq_core::Result<bool> {
        Ok(self.records.get(id).await?.state.is_terminated())
    }

    async fn ack(&self, delivery: JobDelivery<Self::Message>) -> ocrq_core::Result<()> {
        delivery
            .message
            .ack()
            .await
            .map_err(|e| Error::operation("job_ack", e.to_string()).into())
    }
}
