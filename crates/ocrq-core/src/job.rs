//! Job descriptions and the job queue capability.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use derive_more::{From, Into};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};
use uuid::Uuid;

use crate::region::Region;
use crate::{Error, Result};

/// Opaque, time-ordered job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a new identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            Error::invalid_input()
                .with_message(format!("invalid job id '{s}'"))
                .with_source(e)
        })
    }
}

/// Task executed by a worker.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    IntoStaticStr
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    /// Text recognition over regions.
    RunOcr,
    /// Layout detection over regions.
    RunLayout,
    /// Table recognition over regions.
    RunTables,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// How regions are treated by the text recognizer.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OcrMode {
    /// Detect text lines inside each region, then recognize them.
    #[default]
    Block,
    /// Each region is exactly one text line.
    Line,
}

/// Arguments of a queued task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    pub image_url: String,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub mode: OcrMode,
}

impl JobArgs {
    pub fn new(image_url: impl Into<String>, regions: Vec<Region>) -> Self {
        Self {
            image_url: image_url.into(),
            regions,
            mode: OcrMode::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: OcrMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A submitted unit of work. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task: TaskKind,
    pub args: JobArgs,
    pub created_at: Timestamp,
}

impl Job {
    /// Creates a job with a fresh identifier.
    pub fn new(task: TaskKind, args: JobArgs) -> Self {
        Self {
            id: JobId::new(),
            task,
            args,
            created_at: Timestamp::now(),
        }
    }
}

/// Lifecycle of a job as recorded by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running { worker: String },
    Succeeded,
    Failed { reason: String },
    Cancelled { terminate: bool },
}

impl JobState {
    /// Returns `true` once the job will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// `Queued -> Running`.
    ///
    /// A redelivered message (`attempt > 1`) may also take over a job left
    /// `Running` by a worker that never acknowledged it.
    pub fn started(&self, worker: &str, attempt: u64) -> Option<Self> {
        match self {
            Self::Queued => {}
            Self::Running { .. } if attempt > 1 => {}
            _ => return None,
        }
        Some(Self::Running {
            worker: worker.to_owned(),
        })
    }

    /// `Running -> Succeeded`.
    pub fn succeeded(&self) -> Option<Self> {
        matches!(self, Self::Running { .. }).then_some(Self::Succeeded)
    }

    /// `Queued | Running -> Failed`.
    pub fn failed(&self, reason: &str) -> Option<Self> {
        (!self.is_terminal()).then(|| Self::Failed {
            reason: reason.to_owned(),
        })
    }

    /// `Queued | Running -> Cancelled`.
    pub fn cancelled(&self, terminate: bool) -> Option<Self> {
        (!self.is_terminal()).then_some(Self::Cancelled { terminate })
    }

    /// Returns `true` when a running worker must abandon the job.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Cancelled { terminate: true })
    }
}

/// What a single poll of a job observed.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Pending,
    Ready(serde_json::Value),
    Failed(String),
}

/// Broker-side storage and dispatch of jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queues `task` and returns the identifier of the new job.
    async fn submit(&self, task: TaskKind, args: JobArgs) -> Result<JobId>;

    /// Returns the recorded state of a job.
    async fn state(&self, id: &JobId) -> Result<JobState>;

    /// Returns the stored result of a succeeded job without waiting.
    async fn fetch_result(&self, id: &JobId) -> Result<serde_json::Value>;

    /// Revokes a job. With `terminate`, a worker already running it abandons it.
    async fn cancel(&self, id: &JobId, terminate: bool) -> Result<()>;

    async fn poll_ready(&self, id: &JobId) -> Result<bool> {
        Ok(matches!(self.state(id).await?, JobState::Succeeded))
    }

    async fn poll_failed(&self, id: &JobId) -> Result<bool> {
        Ok(matches!(
            self.state(id).await?,
            JobState::Failed { .. } | JobState::Cancelled { .. }
        ))
    }

    /// Polls a job once, fetching its result when ready.
    async fn poll(&self, id: &JobId) -> Result<JobOutcome> {
        match self.state(id).await? {
            JobState::Succeeded => Ok(JobOutcome::Ready(self.fetch_result(id).await?)),
            JobState::Failed { reason } => Ok(JobOutcome::Failed(reason)),
            JobState::Cancelled { .. } => Ok(JobOutcome::Failed("cancelled".to_owned())),
            JobState::Queued | JobState::Running { .. } => Ok(JobOutcome::Pending),
        }
    }
}

/// A job handed to a worker, holding its transport message until
/// acknowledged.
#[derive(Debug)]
pub struct JobDelivery<M> {
    pub job: Job,
    /// Delivery count reported by the broker, starting at 1.
    pub attempt: u64,
    pub message: M,
}

impl<M> JobDelivery<M> {
    pub fn id(&self) -> &JobId {
        &self.job.id
    }

    /// Returns `true` if the broker delivered this job before.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Worker-side access to the job queue.
///
/// A message is only acknowledged after the job record reached a terminal
/// state, or when the job is skipped. An unacknowledged message is
/// redelivered by the broker.
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Transport message carried by each delivery.
    type Message: Send + Sync + 'static;

    /// Fetches the next job without waiting. `None` when the queue is empty.
    async fn next_job(&self) -> Result<Option<JobDelivery<Self::Message>>>;

    /// Marks the delivered job as running on this worker.
    ///
    /// Returns `false` when the job must be skipped.
    async fn start(&self, delivery: &JobDelivery<Self::Message>) -> Result<bool>;

    /// Stores the answer of a finished job.
    async fn complete(&self, id: &JobId, result: serde_json::Value) -> Result<bool>;

    /// Records the failure reason of a job.
    async fn fail(&self, id: &JobId, reason: &str) -> Result<bool>;

    /// Returns `true` once the job was cancelled with `terminate`.
    async fn is_terminated(&self, id: &JobId) -> Result<bool>;

    /// Removes the message from the queue.
    async fn ack(&self, delivery: JobDelivery<Self::Message>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct OneJob(Mutex<JobState>);

    #[async_trait]
    impl JobQueue for OneJob {
        async fn submit(&self, _task: TaskKind, _args: JobArgs) -> Result<JobId> {
            Ok(JobId::new())
        }

        async fn state(&self, _id: &JobId) -> Result<JobState> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn fetch_result(&self, _id: &JobId) -> Result<serde_json::Value> {
            Ok(json!({"result": 1}))
        }

        async fn cancel(&self, _id: &JobId, terminate: bool) -> Result<()> {
            *self.0.lock().unwrap() = JobState::Cancelled { terminate };
            Ok(())
        }
    }

    #[test]
    fn job_id_round_trips_through_strings() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn task_and_mode_wire_names() {
        assert_eq!(TaskKind::RunOcr.to_string(), "run_ocr");
        assert_eq!(serde_json::to_value(TaskKind::RunTables).unwrap(), "run_tables");
        assert_eq!(serde_json::to_value(OcrMode::Line).unwrap(), "line");
    }

    #[test]
    fn job_args_defaults() {
        let args: JobArgs = serde_json::from_value(json!({"image_url": "http://x/a.png"})).unwrap();
        assert!(args.regions.is_empty());
        assert_eq!(args.mode, OcrMode::Block);
    }

    #[test]
    fn job_state_wire_format() {
        let state = JobState::Failed {
            reason: "boom".into(),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"status": "failed", "reason": "boom"})
        );
        assert!(state.is_terminal());
        assert!(!JobState::Running { worker: "w".into() }.is_terminal());
    }

    #[test]
    fn only_redeliveries_take_over_running_jobs() {
        let running = JobState::Queued.started("w1", 1).unwrap();
        assert_eq!(running, JobState::Running { worker: "w1".into() });

        assert!(running.started("w2", 1).is_none());
        assert_eq!(
            running.started("w2", 2),
            Some(JobState::Running { worker: "w2".into() })
        );

        let cancelled = JobState::Cancelled { terminate: false };
        assert!(cancelled.started("w2", 3).is_none());
        assert!(JobState::Succeeded.started("w2", 3).is_none());
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(JobState::Queued.succeeded().is_none());
        assert!(JobState::Succeeded.failed("late").is_none());
        assert!(JobState::Failed { reason: "x".into() }.cancelled(true).is_none());
        assert!(JobState::Queued.cancelled(true).unwrap().is_terminated());
        assert!(!JobState::Queued.cancelled(false).unwrap().is_terminated());
    }

    #[tokio::test]
    async fn poll_maps_states_to_outcomes() {
        let queue = OneJob(Mutex::new(JobState::Queued));
        let id = JobId::new();
        assert_eq!(queue.poll(&id).await.unwrap(), JobOutcome::Pending);
        assert!(!queue.poll_ready(&id).await.unwrap());

        *queue.0.lock().unwrap() = JobState::Succeeded;
        assert!(queue.poll_ready(&id).await.unwrap());
        assert_eq!(
            queue.poll(&id).await.unwrap(),
            JobOutcome::Ready(json!({"result": 1}))
        );

        queue.cancel(&id, true).await.unwrap();
        assert!(queue.poll_failed(&id).await.unwrap());
        assert!(matches!(queue.poll(&id).await.unwrap(), JobOutcome::Failed(_)));
    }
}
