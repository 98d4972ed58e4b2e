//! In-memory worker-side job queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ocrq_core::{Error, Job, JobConsumer, JobDelivery, JobId, JobState, Result};
use serde_json::Value;

/// A call observed by [`MockJobConsumer`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent {
    Started(JobId),
    Skipped(JobId),
    Completed(JobId),
    Failed(JobId, String),
    /// Recording an outcome failed at the broker.
    WriteFailed(JobId),
    Acked(JobId),
}

#[derive(Debug)]
struct Inner {
    worker: String,
    pending: VecDeque<(Job, u64)>,
    states: HashMap<JobId, JobState>,
    results: HashMap<JobId, Value>,
    events: Vec<ConsumerEvent>,
    failing_writes: bool,
}

/// Job consumer over an in-memory message queue and record table.
///
/// Records follow the same transitions as the broker-backed consumer.
/// Clones share state, so a test keeps one handle while a worker owns
/// another.
#[derive(Debug, Clone)]
pub struct MockJobConsumer {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockJobConsumer {
    fn default() -> Self {
        Self::new("mock-worker")
    }
}

impl MockJobConsumer {
    /// An empty queue consumed as `worker`.
    pub fn new(worker: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                worker: worker.to_owned(),
                pending: VecDeque::new(),
                states: HashMap::new(),
                results: HashMap::new(),
                events: Vec::new(),
                failing_writes: false,
            })),
        }
    }

    /// Queues `job` for its first delivery.
    #[must_use]
    pub fn with_job(self, job: Job) -> Self {
        self.with_redelivered(job, 1, JobState::Queued)
    }

    /// Queues `job` as delivery number `attempt`, its record already in
    /// `state`.
    #[must_use]
    pub fn with_redelivered(self, job: Job, attempt: u64, state: JobState) -> Self {
        {
            let mut inner = self.lock();
            inner.states.insert(job.id, state);
            inner.pending.push_back((job, attempt));
        }
        self
    }

    /// Queues `job` without any record.
    #[must_use]
    pub fn with_orphan_message(self, job: Job) -> Self {
        self.lock().pending.push_back((job, 1));
        self
    }

    /// Makes every `complete` and `fail` call error.
    #[must_use]
    pub fn failing_writes(self) -> Self {
        self.lock().failing_writes = true;
        self
    }

    /// Cancels `id` the way the proxy does.
    pub fn cancel(&self, id: &JobId, terminate: bool) {
        let mut inner = self.lock();
        let next = inner.states.get(id).and_then(|s| s.cancelled(terminate));
        if let Some(next) = next {
            inner.states.insert(*id, next);
        }
    }

    pub fn state(&self, id: &JobId) -> Option<JobState> {
        self.lock().states.get(id).cloned()
    }

    pub fn result(&self, id: &JobId) -> Option<Value> {
        self.lock().results.get(id).cloned()
    }

    /// Calls observed so far.
    pub fn events(&self) -> Vec<ConsumerEvent> {
        self.lock().events.clone()
    }

    /// Jobs whose message was acknowledged.
    pub fn acks(&self) -> Vec<JobId> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                ConsumerEvent::Acked(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Messages not fetched yet.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn write(&self, id: &JobId, step: impl FnOnce(&JobState) -> Option<JobState>) -> Result<bool> {
        let mut inner = self.lock();
        if inner.failing_writes {
            inner.events.push(ConsumerEvent::WriteFailed(*id));
            return Err(Error::queue().with_message("record update failed"));
        }
        let current = inner
            .states
            .get(id)
            .ok_or_else(|| Error::queue().with_message(format!("job '{id}' not found")))?;
        match step(current) {
            Some(next) => {
                inner.states.insert(*id, next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobConsumer for MockJobConsumer {
    type Message = ();

    async fn next_job(&self) -> Result<Option<JobDelivery<()>>> {
        Ok(self
            .lock()
            .pending
            .pop_front()
            .map(|(job, attempt)| JobDelivery {
                job,
                attempt,
                message: (),
            }))
    }

    async fn start(&self, delivery: &JobDelivery<()>) -> Result<bool> {
        let id = *delivery.id();
        let mut inner = self.lock();
        let next = inner
            .states
            .get(&id)
            .and_then(|state| state.started(&inner.worker, delivery.attempt));

        match next {
            Some(next) => {
                inner.states.insert(id, next);
                inner.events.push(ConsumerEvent::Started(id));
                Ok(true)
            }
            None => {
                inner.events.push(ConsumerEvent::Skipped(id));
                Ok(false)
            }
        }
    }

    async fn complete(&self, id: &JobId, result: Value) -> Result<bool> {
        let applied = self.write(id, JobState::succeeded)?;
        if applied {
            let mut inner = self.lock();
            inner.results.insert(*id, result);
            inner.events.push(ConsumerEvent::Completed(*id));
        }
        Ok(applied)
    }

    async fn fail(&self, id: &JobId, reason: &str) -> Result<bool> {
        let applied = self.write(id, |state| state.failed(reason))?;
        if applied {
            self.lock()
                .events
                .push(ConsumerEvent::Failed(*id, reason.to_owned()));
        }
        Ok(applied)
    }

    async fn is_terminated(&self, id: &JobId) -> Result<bool> {
        Ok(self
            .lock()
            .states
            .get(id)
            .is_some_and(JobState::is_terminated))
    }

    async fn ack(&self, delivery: JobDelivery<()>) -> Result<()> {
        self.lock().events.push(ConsumerEvent::Acked(*delivery.id()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ocrq_core::{JobArgs, TaskKind};
    use serde_json::json;

    use super::*;

    fn job() -> Job {
        Job::new(TaskKind::RunOcr, JobArgs::new("http://x/a.png", Vec::new()))
    }

    #[tokio::test]
    async fn runs_a_job_through_its_records() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w1").with_job(job);

        let delivery = consumer.next_job().await.unwrap().unwrap();
        assert!(consumer.start(&delivery).await.unwrap());
        assert_eq!(
            consumer.state(&id),
            Some(JobState::Running { worker: "w1".into() })
        );
        assert!(consumer.complete(&id, json!({"result": 1})).await.unwrap());
        consumer.ack(delivery).await.unwrap();

        assert_eq!(consumer.state(&id), Some(JobState::Succeeded));
        assert_eq!(consumer.result(&id), Some(json!({"result": 1})));
        assert_eq!(
            consumer.events(),
            vec![
                ConsumerEvent::Started(id),
                ConsumerEvent::Completed(id),
                ConsumerEvent::Acked(id),
            ]
        );
        assert!(consumer.next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_and_missing_records_are_skipped() {
        let cancelled = job();
        let orphan = job();
        let consumer = MockJobConsumer::default()
            .with_job(cancelled.clone())
            .with_orphan_message(orphan.clone());
        consumer.cancel(&cancelled.id, false);

        let first = consumer.next_job().await.unwrap().unwrap();
        assert!(!consumer.start(&first).await.unwrap());
        let second = consumer.next_job().await.unwrap().unwrap();
        assert!(!consumer.start(&second).await.unwrap());
        assert_eq!(
            consumer.events(),
            vec![
                ConsumerEvent::Skipped(cancelled.id),
                ConsumerEvent::Skipped(orphan.id),
            ]
        );
    }

    #[tokio::test]
    async fn failing_writes_leave_the_record_running() {
        let job = job();
        let id = job.id;
        let consumer = MockJobConsumer::new("w1").with_job(job).failing_writes();

        let delivery = consumer.next_job().await.unwrap().unwrap();
        assert!(consumer.start(&delivery).await.unwrap());
        assert!(consumer.complete(&id, json!({})).await.is_err());
        assert!(consumer.fail(&id, "boom").await.is_err());
        assert!(matches!(consumer.state(&id), Some(JobState::Running { .. })));
    }
}
