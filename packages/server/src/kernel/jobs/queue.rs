//! PostgreSQL-backed job queue.
//!
//! The queue never decides to retry: the caller passes the retry time (from
//! its [`RetryPolicy`]) and the queue writes the Failed row and the retry row
//! in one transaction, so a job chain always has an active row until it ends.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use super::job::{Job, NewJob};
use super::retry::RetryPolicy;
use crate::common::JobId;

/// Retry row enqueued alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    pub job_id: JobId,
    pub run_at: DateTime<Utc>,
}

/// A job that just moved to Failed.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: Job,
    pub retry: Option<ScheduledRetry>,
}

/// Enqueue/claim/complete/fail protocol over the job store.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a Pending job. Fails only when storage is unavailable.
    async fn enqueue(&self, job: NewJob) -> Result<JobId>;

    /// Claim the highest-priority, oldest eligible Pending job, or `None`.
    ///
    /// Safe under any number of concurrent callers: a job is handed to at
    /// most one of them.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Mark a running job Done. Returns false (and changes nothing) if the
    /// job was not running, so repeated calls are harmless.
    async fn complete(&self, job_id: JobId) -> Result<bool>;

    /// Mark a running job Failed with `error`, enqueueing a retry eligible at
    /// `retry_at` if one is given. Returns `None` (and enqueues nothing) if
    /// the job was not running.
    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<FailedJob>>;

    /// Fail every job running longer than `lease_timeout`, enqueueing
    /// retries for those `retry_policy` allows.
    async fn fail_stale(
        &self,
        lease_timeout: Duration,
        retry_policy: &RetryPolicy,
    ) -> Result<Vec<FailedJob>>;
}

/// PostgreSQL-backed job queue implementation.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_retry(
    failed: &Job,
    run_at: DateTime<Utc>,
    conn: &mut PgConnection,
) -> Result<ScheduledRetry> {
    let retry = NewJob::retry_of(failed, run_at).insert(&mut *conn).await?;
    info!(
        job_id = %failed.id,
        retry_job_id = %retry.id,
        attempts = failed.attempts,
        run_at = %run_at,
        "scheduled job retry"
    );
    Ok(ScheduledRetry {
        job_id: retry.id,
        run_at,
    })
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId> {
        let inserted = job.insert(&self.pool).await?;
        debug!(
            job_id = %inserted.id,
            job_type = %inserted.job_type,
            scheduled_at = ?inserted.scheduled_at,
            "enqueued job"
        );
        Ok(inserted.id)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        Job::claim_next(&self.pool).await
    }

    async fn complete(&self, job_id: JobId) -> Result<bool> {
        let completed = Job::mark_done(job_id, &self.pool).await?;
        if !completed {
            debug!(job_id = %job_id, "complete ignored: job not running");
        }
        Ok(completed)
    }

    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<FailedJob>> {
        let mut tx = self.pool.begin().await?;

        let Some(job) = Job::mark_failed(job_id, error, &mut *tx).await? else {
            debug!(job_id = %job_id, "fail ignored: job not running");
            return Ok(None);
        };
        let retry = match retry_at {
            Some(run_at) => Some(insert_retry(&job, run_at, &mut *tx).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some(FailedJob { job, retry }))
    }

    async fn fail_stale(
        &self,
        lease_timeout: Duration,
        retry_policy: &RetryPolicy,
    ) -> Result<Vec<FailedJob>> {
        let mut tx = self.pool.begin().await?;

        let stale = Job::fail_stale(lease_timeout, &mut *tx).await?;
        let now = Utc::now();
        let mut swept = Vec::with_capacity(stale.len());
        for job in stale {
            let retry = match retry_policy.next_run_at(&job, now) {
                Some(run_at) => Some(insert_retry(&job, run_at, &mut *tx).await?),
                None => None,
            };
            swept.push(FailedJob { job, retry });
        }

        tx.commit().await?;
        Ok(swept)
    }
}
