//! Handler seam between the worker loop and the stage logic.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::job::Job;
use crate::common::JobId;
use crate::kernel::ServerDeps;

/// How a claimed job ended, as seen by post-job hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The handler returned `Ok`. Its Done write normally committed too, but
    /// may have failed on a storage error.
    Succeeded,
    /// Failed, and a retry row was enqueued
    Retrying { retry_job_id: JobId, run_at: DateTime<Utc> },
    /// Failed with no attempts left
    Failed { error: String },
}

/// Executes claimed jobs. Returning `Err` is the only failure signal the
/// worker understands; side effects committed before the error stay committed.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &Job, deps: &ServerDeps) -> Result<()>;

    /// Called once per claimed job after its terminal write (and after any
    /// retry row was enqueued). Not called when the job turned out to have
    /// been swept while it ran; the sweeper reports that one instead.
    async fn after_job(&self, job: &Job, outcome: &JobOutcome, deps: &ServerDeps) -> Result<()> {
        let _ = (job, outcome, deps);
        Ok(())
    }
}
