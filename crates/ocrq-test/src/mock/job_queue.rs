//! Scripted in-memory job queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ocrq_core::{Error, JobArgs, JobId, JobQueue, JobState, Result, TaskKind};
use serde_json::Value;

/// One scripted answer to a `state` call.
#[derive(Debug, Clone)]
enum Step {
    State(JobState),
    BrokerError(String),
}

#[derive(Debug)]
struct Inner {
    script: VecDeque<Step>,
    fallback: JobState,
    result: Value,
    submit_error: Option<String>,
    submissions: Vec<(JobId, TaskKind, JobArgs)>,
    cancels: Vec<(JobId, bool)>,
    polls: usize,
}

/// Job queue whose `state` answers follow a script.
///
/// Each `state` call consumes the next scripted step; once the script is
/// exhausted the queue keeps reporting its fallback state (`Queued` unless
/// changed). Submissions, state calls and cancellations are recorded.
#[derive(Debug)]
pub struct MockJobQueue {
    inner: Mutex<Inner>,
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJobQueue {
    /// A queue whose jobs never leave the `Queued` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                script: VecDeque::new(),
                fallback: JobState::Queued,
                result: Value::Null,
                submit_error: None,
                submissions: Vec::new(),
                cancels: Vec::new(),
                polls: 0,
            }),
        }
    }

    /// A queue whose job succeeds with `result` after `pending` pending polls.
    pub fn ready_after(pending: usize, result: Value) -> Self {
        let queue = Self::new().with_result(result);
        for _ in 0..pending {
            queue.push(Step::State(JobState::Queued));
        }
        queue.lock().fallback = JobState::Succeeded;
        queue
    }

    /// A queue whose job fails with `reason` after `pending` pending polls.
    pub fn failing_after(pending: usize, reason: &str) -> Self {
        let queue = Self::new();
        for _ in 0..pending {
            queue.push(Step::State(JobState::Queued));
        }
        queue.lock().fallback = JobState::Failed {
            reason: reason.to_owned(),
        };
        queue
    }

    /// Appends `state` to the script.
    #[must_use]
    pub fn then_state(self, state: JobState) -> Self {
        self.push(Step::State(state));
        self
    }

    /// Appends one failing `state` call to the script.
    #[must_use]
    pub fn then_broker_error(self, message: &str) -> Self {
        self.push(Step::BrokerError(message.to_owned()));
        self
    }

    /// Sets the state reported once the script is exhausted.
    #[must_use]
    pub fn with_fallback(self, state: JobState) -> Self {
        self.lock().fallback = state;
        self
    }

    /// Sets the value returned by `fetch_result`.
    #[must_use]
    pub fn with_result(self, result: Value) -> Self {
        self.lock().result = result;
        self
    }

    /// Makes every `submit` fail with `message`.
    #[must_use]
    pub fn failing_submit(self, message: &str) -> Self {
        self.lock().submit_error = Some(message.to_owned());
        self
    }

    /// Jobs submitted so far.
    pub fn submissions(&self) -> Vec<(JobId, TaskKind, JobArgs)> {
        self.lock().submissions.clone()
    }

    /// Cancellations requested so far.
    pub fn cancels(&self) -> Vec<(JobId, bool)> {
        self.lock().cancels.clone()
    }

    /// Number of `state` calls so far.
    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    fn push(&self, step: Step) {
        self.lock().script.push_back(step);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread cannot leave the script half-updated.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn submit(&self, task: TaskKind, args: JobArgs) -> Result<JobId> {
        let mut inner = self.lock();
        if let Some(message) = &inner.submit_error {
            return Err(Error::queue().with_message(message.clone()));
        }
        let id = JobId::new();
        inner.submissions.push((id, task, args));
        Ok(id)
    }

    async fn state(&self, _id: &JobId) -> Result<JobState> {
        let mut inner = self.lock();
        inner.polls += 1;
        match inner.script.pop_front() {
            Some(Step::State(state)) => Ok(state),
            Some(Step::BrokerError(message)) => Err(Error::queue().with_message(message)),
            None => Ok(inner.fallback.clone()),
        }
    }

    async fn fetch_result(&self, _id: &JobId) -> Result<Value> {
        Ok(self.lock().result.clone())
    }

    async fn cancel(&self, id: &JobId, terminate: bool) -> Result<()> {
        let mut inner = self.lock();
        inner.cancels.push((*id, terminate));
        inner.fallback = JobState::Cancelled { terminate };
        Ok(())
    }
}
