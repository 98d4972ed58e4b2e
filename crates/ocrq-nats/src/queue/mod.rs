//! JetStream work queue and job records.
//!
//! Jobs travel over a work-queue stream (`JOBS_<QUEUE>`, subjects
//! `jobs.<queue>.<task>`), while their state and result live in the
//! [`JobsBucket`](crate::kv::JobsBucket) KV bucket keyed by job id. The
//! stream delivers each job to one worker at a time; the record is what the
//! proxy polls and what cancellation marks.

mod consumer;
mod job_stream;
mod nats_queue;
mod record;

pub use consumer::NatsJobConsumer;
pub use job_stream::JobStream;
pub use nats_queue::NatsJobQueue;
pub use record::{JobRecord, JobRecords, Transition};
