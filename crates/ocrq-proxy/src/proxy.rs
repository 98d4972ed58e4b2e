//! Submit, poll with backoff, cancel on timeout.

use std::sync::Arc;

use ocrq_core::{
    Answer, Error, JobArgs, JobId, JobOutcome, JobQueue, LayoutPage, OcrAnswer, OcrMode,
    OcrResult, Region, Result, TablePage, TaskKind,
};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use url::Url;

use crate::TRACING_TARGET_TRANSCRIBE;
use crate::backoff::Backoff;
use crate::config::ProxyConfig;
use crate::rewrite::ImageCacheRewrite;

/// Forwards requests to the job queue and waits for their answers.
///
/// Every call validates its input before anything is submitted, then polls
/// the job with [`Backoff`] delays. A job still pending when the timeout
/// elapses is cancelled with `terminate` and answered with an error. Broker
/// errors while polling are logged and polling goes on.
#[derive(Clone)]
pub struct OcrProxy {
    queue: Arc<dyn JobQueue>,
    config: ProxyConfig,
    rewrite: ImageCacheRewrite,
}

impl OcrProxy {
    pub fn new(queue: Arc<dyn JobQueue>, config: ProxyConfig) -> Self {
        let rewrite = config.image_cache_rewrite();
        Self {
            queue,
            config,
            rewrite,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Transcribes the regions (a JSON list, may be empty) of an image.
    #[tracing::instrument(skip(self, regions), target = TRACING_TARGET_TRANSCRIBE)]
    pub async fn transcribe(&self, image_url: &str, regions: &str, mode: OcrMode) -> OcrAnswer {
        let args = match self.prepare(image_url, regions) {
            Ok(args) => args.with_mode(mode),
            Err(error) => return rejected(error),
        };
        self.run::<OcrResult>(TaskKind::RunOcr, args).await
    }

    /// Detects layout blocks in the regions of an image.
    #[tracing::instrument(skip(self, regions), target = TRACING_TARGET_TRANSCRIBE)]
    pub async fn analyze_layout(&self, image_url: &str, regions: &str) -> Answer<LayoutPage> {
        match self.prepare(image_url, regions) {
            Ok(args) => self.run(TaskKind::RunLayout, args).await,
            Err(error) => rejected(error),
        }
    }

    /// Recognizes tables in the regions of an image.
    #[tracing::instrument(skip(self, regions), target = TRACING_TARGET_TRANSCRIBE)]
    pub async fn recognize_tables(&self, image_url: &str, regions: &str) -> Answer<TablePage> {
        match self.prepare(image_url, regions) {
            Ok(args) => self.run(TaskKind::RunTables, args).await,
            Err(error) => rejected(error),
        }
    }

    /// Validates the request and applies the cache rewrite.
    fn prepare(&self, image_url: &str, regions: &str) -> Result<JobArgs> {
        let url = Url::parse(image_url).map_err(|e| {
            Error::invalid_input()
                .with_message(format!("invalid image url '{image_url}': {e}"))
                .with_source(e)
        })?;
        if url.cannot_be_a_base() {
            return Err(Error::invalid_input()
                .with_message(format!("invalid image url '{image_url}': not a hierarchical url")));
        }

        let regions = Region::parse_list(regions)?;

        let image_url = self.rewrite.apply(image_url);
        Ok(JobArgs::new(image_url, regions))
    }

    async fn run<T: DeserializeOwned>(&self, task: TaskKind, args: JobArgs) -> Answer<T> {
        let region_count = args.regions.len();
        let id = match self.queue.submit(task, args).await {
            Ok(id) => id,
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_TRANSCRIBE,
                    task = %task,
                    error = %error,
                    "Failed to submit job"
                );
                return Answer::error(format!("failed to submit job: {}", error.message_or_kind()));
            }
        };

        tracing::info!(
            target: TRACING_TARGET_TRANSCRIBE,
            job_id = %id,
            task = %task,
            regions = region_count,
            "Job submitted"
        );

        self.wait(&id).await
    }

    async fn wait<T: DeserializeOwned>(&self, id: &JobId) -> Answer<T> {
        let timeout = self.config.timeout();
        let mut backoff = Backoff::new(self.config.initial_backoff(), timeout);
        let started = Instant::now();

        while started.elapsed() < timeout {
            match self.queue.poll(id).await {
                Ok(JobOutcome::Ready(value)) => {
                    tracing::info!(
                        target: TRACING_TARGET_TRANSCRIBE,
                        job_id = %id,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Job ready"
                    );
                    return decode_answer(id, value);
                }
                Ok(JobOutcome::Failed(reason)) => {
                    tracing::warn!(
                        target: TRACING_TARGET_TRANSCRIBE,
                        job_id = %id,
                        reason = %reason,
                        "Job failed"
                    );
                    return Answer::error(format!("{id} failed: {reason}"));
                }
                Ok(JobOutcome::Pending) => {}
                Err(error) => tracing::warn!(
                    target: TRACING_TARGET_TRANSCRIBE,
                    job_id = %id,
                    error = %error,
                    "Failed to poll job"
                ),
            }

            let delay = backoff.advance();
            tracing::trace!(
                target: TRACING_TARGET_TRANSCRIBE,
                job_id = %id,
                backoff_ms = delay.as_millis(),
                "Job pending"
            );
            tokio::time::sleep(delay).await;
        }

        let timeout_secs = self.config.task_timeout_secs;
        tracing::warn!(
            target: TRACING_TARGET_TRANSCRIBE,
            job_id = %id,
            timeout_secs,
            "Timed out waiting for job, cancelling"
        );
        if let Err(error) = self.queue.cancel(id, true).await {
            tracing::error!(
                target: TRACING_TARGET_TRANSCRIBE,
                job_id = %id,
                error = %error,
                "Failed to cancel job"
            );
        }

        Answer::error(format!("timeout waiting for {id} after {timeout_secs}s"))
    }
}

fn rejected<T>(error: Error) -> Answer<T> {
    tracing::info!(
        target: TRACING_TARGET_TRANSCRIBE,
        error = %error,
        "Request rejected"
    );
    Answer::error(error.message_or_kind())
}

fn decode_answer<T: DeserializeOwned>(id: &JobId, value: serde_json::Value) -> Answer<T> {
    serde_json::from_value(value)
        .unwrap_or_else(|e| Answer::error(format!("{id} returned a malformed result: {e}")))
}
