//! Durable job queue and the workers that drain it.
//!
//! - [`Job`] / [`NewJob`] - job rows and their SQL
//! - [`JobQueue`] / [`PostgresJobQueue`] - enqueue, atomic claim, complete, fail
//! - [`RetryPolicy`] - bounded exponential backoff, applied by workers
//! - [`JobWorker`] / [`JobRunner`] - polling loops, stale-job sweeper, shutdown
//!
//! Stage logic lives in `domains::pipeline` behind [`JobHandler`].

mod handler;
mod job;
mod queue;
mod retry;
mod runner;
mod worker;

pub use handler::{JobHandler, JobOutcome};
pub use job::{ActiveStageCounts, Job, JobStatus, JobType, NewJob};
pub use queue::{FailedJob, JobQueue, PostgresJobQueue, ScheduledRetry};
pub use retry::RetryPolicy;
pub use runner::{sweep_stale_jobs, JobRunner, RunHandle, RunnerConfig};
pub use worker::{JobWorker, JobWorkerConfig};
