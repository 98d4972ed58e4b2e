//! OCR job worker.

use ocrq_core::{JobConsumer, JobDelivery, JobId};
use ocrq_nats::queue::NatsJobConsumer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_WORKER;
use crate::error::Result;
use crate::pipeline::OcrPipeline;
use crate::service::{WorkerConfig, WorkerState};

/// Background worker for OCR, layout and table jobs.
///
/// Marks each job running before executing it, stores the answer or the
/// failure reason on the job record, and acknowledges the message last. A
/// message whose outcome could not be recorded stays unacknowledged and is
/// redelivered. A job cancelled with `terminate` while running is abandoned.
pub struct OcrWorker<C> {
    consumer: C,
    pipeline: OcrPipeline,
    config: WorkerConfig,
    cancel_token: CancellationToken,
}

impl OcrWorker<NatsJobConsumer> {
    /// Binds a worker to the NATS queue named in the state's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the job stream or its consumer cannot be opened.
    pub async fn connect(state: WorkerState, cancel_token: CancellationToken) -> Result<Self> {
        let worker_name = state.config.worker_name();
        let consumer = state
            .nats
            .job_consumer(&state.config.queue, &worker_name)
            .await?;
        Ok(Self::new(consumer, state.pipeline, state.config, cancel_token))
    }
}

impl<C> OcrWorker<C>
where
    C: JobConsumer + 'static,
{
    /// Creates a new worker.
    ///
    /// # Arguments
    ///
    /// * `consumer` - Worker side of the job queue
    /// * `pipeline` - Job body shared by every job of this process
    /// * `config` - Polling intervals and queue name
    /// * `cancel_token` - Token for graceful shutdown signaling
    pub fn new(
        consumer: C,
        pipeline: OcrPipeline,
        config: WorkerConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            pipeline,
            config,
            cancel_token,
        }
    }

    /// Spawns the worker as a background task.
    ///
    /// Returns a join handle that can be used to await worker completion
    /// on shutdown.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs the worker loop until the cancellation token fires.
    ///
    /// A job already fetched is finished before the loop stops.
    #[tracing::instrument(
        skip(self),
        fields(queue = %self.config.queue),
        target = TRACING_TARGET_WORKER,
        name = "ocr_worker"
    )]
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            target: TRACING_TARGET_WORKER,
            worker = %self.config.worker_name(),
            "Starting OCR worker"
        );

        let idle_interval = self.config.idle_interval();

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    tracing::info!(
                        target: TRACING_TARGET_WORKER,
                        "Shutdown requested, stopping OCR worker"
                    );
                    break;
                }

                next = self.consumer.next_job() => match next {
                    Ok(Some(delivery)) => self.handle_delivery(delivery).await,
                    Ok(None) => {
                        tracing::trace!(target: TRACING_TARGET_WORKER, "No jobs available");
                        tokio::time::sleep(idle_interval).await;
                    }
                    Err(err) => {
                        tracing::error!(
                            target: TRACING_TARGET_WORKER,
                            error = %err,
                            "Failed to fetch job"
                        );
                        tokio::time::sleep(idle_interval).await;
                    }
                },
            }
        }

        Ok(())
    }

    #[tracing::instrument(
        skip(self, delivery),
        fields(job_id = %delivery.job.id, task = %delivery.job.task, attempt = delivery.attempt),
        target = TRACING_TARGET_WORKER
    )]
    async fn handle_delivery(&self, delivery: JobDelivery<C::Message>) {
        let job_id = delivery.job.id;

        match self.consumer.start(&delivery).await {
            Ok(true) => {}
            Ok(false) => return self.ack(delivery).await,
            Err(err) => {
                // Left unacknowledged so the message is redelivered.
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    error = %err,
                    "Failed to mark job running"
                );
                return;
            }
        }

        tracing::info!(target: TRACING_TARGET_WORKER, "Processing job");

        // Dropping the pipeline future abandons the job; a recognition call
        // already on the blocking pool runs to completion and is discarded.
        let outcome = tokio::select! {
            result = self.pipeline.execute(&delivery.job) => Some(result),
            () = self.wait_for_termination(&job_id) => None,
        };

        let recorded = match outcome {
            Some(Ok(answer)) => self.consumer.complete(&job_id, answer).await,
            Some(Err(err)) => {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    error = %err,
                    "Job failed"
                );
                self.consumer.fail(&job_id, &err.to_string()).await
            }
            None => {
                tracing::info!(
                    target: TRACING_TARGET_WORKER,
                    "Job terminated while running, abandoning"
                );
                Ok(false)
            }
        };

        match recorded {
            Ok(true) => tracing::info!(target: TRACING_TARGET_WORKER, "Job finished"),
            Ok(false) => tracing::debug!(
                target: TRACING_TARGET_WORKER,
                "Job was cancelled, result discarded"
            ),
            Err(err) => {
                // The record is still running; a redelivery takes it over.
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    error = %err,
                    "Failed to record job outcome, leaving message for redelivery"
                );
                return;
            }
        }

        self.ack(delivery).await;
    }

    /// Resolves once the job record is cancelled with `terminate`.
    async fn wait_for_termination(&self, job_id: &JobId) {
        let interval = self.config.cancel_check_interval();
        loop {
            tokio::time::sleep(interval).await;
            match self.consumer.is_terminated(job_id).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    job_id = %job_id,
                    error = %err,
                    "Failed to check job cancellation"
                ),
            }
        }
    }

    async fn ack(&self, delivery: JobDelivery<C::Message>) {
        let job_id = delivery.job.id;
        if let Err(err) = self.consumer.ack(delivery).await {
            tracing::error!(
                target: TRACING_TARGET_WORKER,
                job_id = %job_id,
                error = %err,
                "Failed to ack message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use image::{DynamicImage, Rgb, RgbImage};
    use ocrq_core::{Job, JobArgs, JobState, TaskKind};
    use ocrq_nats::NatsConfig;
    use ocrq_test::{
        ConsumerEvent, MockEngine, MockEngineLoader, MockImageSource, MockJobConsumer,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::service::EngineCell;

    const URL: &str = "http://images.test/page.png";

    struct Fixture {
        consumer: MockJobConsumer,
        source: Arc<MockImageSource>,
        cancel_token: CancellationToken,
        handle: JoinHandle<Result<()>>,
        _dir: TempDir,
    }

    impl Fixture {
        fn start(consumer: MockJobConsumer, source: MockImageSource) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let loader = MockEngineLoader::new(MockEngine::default());
            let engine = EngineCell::new(Arc::new(loader), dir.path());
            let source = Arc::new(source);
            let pipeline = OcrPipeline::new(Arc::new(engine), source.clone());

            let mut config = WorkerConfig::new(NatsConfig::default(), dir.path());
            config.worker_name = Some("w2".into());
            config.idle_interval_ms = 50;
            config.cancel_check_interval_ms = 100;

            let cancel_token = CancellationToken::new();
            let handle = OcrWorker::new(consumer.clone(), pipeline, config, cancel_token.clone())
                .spawn();

            Self {
                consumer,
                source,
                cancel_token,
                handle,
                _dir: dir,
            }
        }

        async fn wait_for(&self, done: impl Fn(&[ConsumerEvent]) -> bool) {
            tokio::time::timeout(Duration::from_secs(3600), async {
                while !done(&self.consumer.events()) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("worker never reached the expected state");
        }

        async fn stop(self) -> MockJobConsumer {
            self.cancel_token.cancel();
            self.handle.await.unwrap().unwrap();
            self.consumer
        }
    }

    fn job() -> Job {
        Job::new(TaskKind::RunOcr, JobArgs::new(URL, Vec::new()))
    }

    fn page_source() -> MockImageSource {
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([255, 255, 255])));
        MockImageSource::new().with_image(URL, &page)
    }

    fn acked(id: JobId) -> impl Fn(&[ConsumerEvent]) -> bool {
        move |events| events.contains(&ConsumerEvent::Acked(id))
    }

    #[tokio::test(start_paused = true)]
    async fn job_cancelled_before_start_is_skipped() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w2").with_job(job);
        consumer.cancel(&id, false);

        let fixture = Fixture::start(consumer, page_source());
        fixture.wait_for(acked(id)).await;
        assert_eq!(fixture.source.fetches(), 0);

        let consumer = fixture.stop().await;
        assert_eq!(
            consumer.events(),
            vec![ConsumerEvent::Skipped(id), ConsumerEvent::Acked(id)]
        );
        assert_eq!(
            consumer.state(&id),
            Some(JobState::Cancelled { terminate: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn job_terminated_while_running_is_abandoned() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w2").with_job(job);
        let source = page_source().with_delay(Duration::from_secs(30));

        let fixture = Fixture::start(consumer, source);
        fixture
            .wait_for(|events| events.contains(&ConsumerEvent::Started(id)))
            .await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        fixture.consumer.cancel(&id, true);
        fixture.wait_for(acked(id)).await;

        let consumer = fixture.stop().await;
        assert_eq!(
            consumer.events(),
            vec![ConsumerEvent::Started(id), ConsumerEvent::Acked(id)]
        );
        assert_eq!(
            consumer.state(&id),
            Some(JobState::Cancelled { terminate: true })
        );
        assert!(consumer.result(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn message_is_acked_after_the_terminal_record() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w2").with_job(job);

        let fixture = Fixture::start(consumer, page_source());
        fixture.wait_for(acked(id)).await;

        let consumer = fixture.stop().await;
        assert_eq!(
            consumer.events(),
            vec![
                ConsumerEvent::Started(id),
                ConsumerEvent::Completed(id),
                ConsumerEvent::Acked(id),
            ]
        );
        assert_eq!(consumer.state(&id), Some(JobState::Succeeded));
        assert!(consumer.result(&id).unwrap()["result"].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn unrecorded_outcome_leaves_message_unacked() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w2").with_job(job).failing_writes();

        let fixture = Fixture::start(consumer, page_source());
        fixture
            .wait_for(|events| events.contains(&ConsumerEvent::WriteFailed(id)))
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let consumer = fixture.stop().await;
        assert!(consumer.acks().is_empty());
        assert_eq!(
            consumer.state(&id),
            Some(JobState::Running { worker: "w2".into() })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_running_job_is_resumed() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w2").with_redelivered(
            job,
            2,
            JobState::Running {
                worker: "w1".into(),
            },
        );

        let fixture = Fixture::start(consumer, page_source());
        fixture.wait_for(acked(id)).await;

        let consumer = fixture.stop().await;
        assert_eq!(
            consumer.events(),
            vec![
                ConsumerEvent::Started(id),
                ConsumerEvent::Completed(id),
                ConsumerEvent::Acked(id),
            ]
        );
        assert_eq!(consumer.state(&id), Some(JobState::Succeeded));
    }
}
