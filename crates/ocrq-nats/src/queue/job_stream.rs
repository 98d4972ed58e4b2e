//! Work-queue stream carrying submitted jobs.

use std::time::Duration;

use async_nats::jetstream::{self, consumer, stream};
use ocrq_core::Job;

use crate::{Error, Result, TRACING_TARGET_QUEUE};

/// Time a worker may hold a job before it is redelivered.
const ACK_WAIT: Duration = Duration::from_secs(10 * 60);

/// Maximum deliveries of one job message.
const MAX_DELIVER: i64 = 3;

/// Work-queue stream of one named queue.
#[derive(Debug, Clone)]
pub struct JobStream {
    jetstream: jetstream::Context,
    queue: String,
    stream_name: String,
}

impl JobStream {
    /// Gets or creates the stream backing `queue`.
    #[tracing::instrument(skip(jetstream), target = TRACING_TARGET_QUEUE)]
    pub(crate) async fn new(jetstream: &jetstream::Context, queue: &str) -> Result<Self> {
        if queue.is_empty() || queue.contains(['.', '*', '>', ' ']) {
            return Err(Error::invalid_config(format!(
                "invalid queue name '{queue}'"
            )));
        }

        let stream_name = format!("JOBS_{}", queue.to_uppercase());

        match jetstream.get_stream(&stream_name).await {
            Ok(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_QUEUE,
                    stream = %stream_name,
                    "Using existing job stream"
                );
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_QUEUE,
                    stream = %stream_name,
                    queue = %queue,
                    "Creating new job stream"
                );
                let stream_config = stream::Config {
                    name: stream_name.clone(),
                    description: Some(format!("OCR job queue: {queue}")),
                    subjects: vec![format!("jobs.{queue}.>")],
                    retention: stream::RetentionPolicy::WorkQueue,
                    ..Default::default()
                };
                jetstream
                    .create_stream(stream_config)
                    .await
                    .map_err(|e| Error::operation("stream_create", e.to_string()))?;
            }
        }

        Ok(Self {
            jetstream: jetstream.clone(),
            queue: queue.to_owned(),
            stream_name,
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Subject a job is published on: `jobs.<queue>.<task>`.
    pub fn subject(&self, job: &Job) -> String {
        format!("jobs.{}.{}", self.queue, job.task)
    }

    /// Publishes `job` and waits for the stream acknowledgement.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id), target = TRACING_TARGET_QUEUE)]
    pub async fn publish(&self, job: &Job) -> Result<()> {
        let subject = self.subject(job);
        let payload = serde_json::to_vec(job)?;

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| Error::operation("job_publish", e.to_string()))?
            .await
            .map_err(|e| Error::operation("job_publish_ack", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_QUEUE,
            job_id = %job.id,
            task = %job.task,
            subject = %subject,
            "Published job"
        );
        Ok(())
    }

    /// Gets or creates the durable pull consumer shared by all workers.
    ///
    /// A work-queue stream admits one consumer per subject, so workers bind
    /// to the same durable consumer and split its messages.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub(crate) async fn consumer(&self) -> Result<consumer::PullConsumer> {
        let consumer_name = format!("{}_workers", self.queue);

        let consumer_config = consumer::pull::Config {
            durable_name: Some(consumer_name.clone()),
            description: Some(format!("Workers of job queue {}", self.queue)),
            ack_wait: ACK_WAIT,
            max_deliver: MAX_DELIVER,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| Error::operation("stream_get", e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(&consumer_name, consumer_config)
            .await
            .map_err(|e| Error::operation("consumer_create", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_QUEUE,
            consumer = %consumer_name,
            stream = %self.stream_name,
            "Bound worker consumer"
        );
        Ok(consumer)
    }
}
