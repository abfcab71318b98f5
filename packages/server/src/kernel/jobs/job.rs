//! Job model for the background pipeline.
//!
//! Rows are created Pending by enqueue, moved to Running by a claim, and
//! finished with exactly one terminal write (Done or Failed). Rows are never
//! deleted; a retry is a new row pointing back at the failed one.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::{CompanyId, JobId, SearchId};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Discovery,
    Crawl,
    Enrichment,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Discovery => "discovery",
            JobType::Crawl => "crawl",
            JobType::Enrichment => "enrichment",
        }
    }

    /// Default queue priority for the stage. Later stages run first so that
    /// searches already in flight finish before new discovery fans out.
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::Discovery => 0,
            JobType::Crawl => 10,
            JobType::Enrichment => 20,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Entity being processed: the search for discovery, a company otherwise
    pub target_id: Uuid,
    pub search_id: Option<SearchId>,
    pub priority: i32,
    /// Not eligible for claiming before this time
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Incremented by every claim, carried over to retry rows
    pub attempts: i32,
    pub last_error: Option<String>,
    pub retry_of: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Insert payload for a job. Everything not listed here is owned by the queue.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewJob {
    pub job_type: JobType,
    pub target_id: Uuid,
    #[builder(default, setter(strip_option))]
    pub search_id: Option<SearchId>,
    #[builder(default, setter(strip_option))]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[builder(default = 0)]
    pub priority: i32,
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default, setter(strip_option))]
    pub retry_of: Option<JobId>,
}

impl NewJob {
    /// Discovery job for a freshly created search.
    pub fn discovery(search_id: SearchId) -> Self {
        Self::builder()
            .job_type(JobType::Discovery)
            .target_id(search_id)
            .search_id(search_id)
            .priority(JobType::Discovery.default_priority())
            .build()
    }

    pub fn crawl(company_id: CompanyId, search_id: SearchId) -> Self {
        Self::builder()
            .job_type(JobType::Crawl)
            .target_id(company_id)
            .search_id(search_id)
            .priority(JobType::Crawl.default_priority())
            .build()
    }

    pub fn enrichment(company_id: CompanyId, search_id: SearchId) -> Self {
        Self::builder()
            .job_type(JobType::Enrichment)
            .target_id(company_id)
            .search_id(search_id)
            .priority(JobType::Enrichment.default_priority())
            .build()
    }

    /// Retry row for a failed job, eligible at `run_at`.
    pub fn retry_of(job: &Job, run_at: DateTime<Utc>) -> Self {
        Self {
            job_type: job.job_type,
            target_id: job.target_id,
            search_id: job.search_id,
            scheduled_at: Some(run_at),
            priority: job.priority,
            attempts: job.attempts,
            retry_of: Some(job.id),
        }
    }

    /// Insert the job as Pending. Works against the pool or inside a
    /// caller's transaction (`&mut *tx`).
    pub async fn insert<'e, E>(self, executor: E) -> Result<Job>
    where
        E: PgExecutor<'e>,
    {
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, job_type, status, target_id, search_id, priority, scheduled_at, attempts, retry_of)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(self.job_type)
        .bind(self.target_id)
        .bind(self.search_id)
        .bind(self.priority)
        .bind(self.scheduled_at)
        .bind(self.attempts)
        .bind(self.retry_of)
        .fetch_one(executor)
        .await?;

        Ok(job)
    }
}

/// Pending/Running job counts for one search, per fan-out stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct ActiveStageCounts {
    pub crawl: i64,
    pub enrichment: i64,
}

impl Job {
    /// Whether the job could be claimed at `now`.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at.map_or(true, |at| at <= now)
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        match self.job_type {
            JobType::Crawl | JobType::Enrichment => Some(CompanyId::from_uuid(self.target_id)),
            JobType::Discovery => None,
        }
    }

    pub async fn find_by_id<'e, E>(id: JobId, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }

    /// All jobs for a search, oldest first (audit view).
    pub async fn find_by_search<'e, E>(search_id: SearchId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM jobs WHERE search_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(search_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Atomically claim the best eligible pending job.
    ///
    /// Selection and the Running transition happen in one statement; the row
    /// lock with `SKIP LOCKED` means concurrent claimers each get a different
    /// row (or none) instead of racing on the same one.
    pub async fn claim_next<'e, E>(executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        let job = sqlx::query_as::<_, Self>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE status = 'pending'
                  AND (scheduled_at IS NULL OR scheduled_at <= NOW())
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                started_at = NOW(),
                attempts = jobs.attempts + 1,
                updated_at = NOW()
            FROM next_job
            WHERE jobs.id = next_job.id
            RETURNING jobs.*
            "#,
        )
        .fetch_optional(executor)
        .await?;

        Ok(job)
    }

    /// Running -> Done. Returns false when the job was not running
    /// (already finished, swept, or unknown), leaving the row untouched.
    pub async fn mark_done<'e, E>(id: JobId, executor: E) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done',
                finished_at = NOW(),
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Running -> Failed with the error text. Returns the updated row, or
    /// `None` when the job was not running.
    pub async fn mark_failed<'e, E>(id: JobId, error: &str, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        let job = sqlx::query_as::<_, Self>(
            r#"
            UPDATE jobs
            SET status = 'failed',
                finished_at = NOW(),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(executor)
        .await?;

        Ok(job)
    }

    /// Fail every job that has been running longer than `lease_timeout`.
    pub async fn fail_stale<'e, E>(lease_timeout: Duration, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            UPDATE jobs
            SET status = 'failed',
                finished_at = NOW(),
                last_error = 'lease expired: worker presumed dead',
                updated_at = NOW()
            WHERE status = 'running'
              AND started_at < NOW() - make_interval(secs => $1)
            RETURNING *
            "#,
        )
        .bind(lease_timeout.as_secs_f64())
        .fetch_all(executor)
        .await?;

        Ok(jobs)
    }

    /// Jobs of one type still pending or running for a search.
    pub async fn count_active_for_search<'e, E>(
        search_id: SearchId,
        job_type: JobType,
        executor: E,
    ) -> Result<i64>
    where
        E: PgExecutor<'e>,
    {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM jobs
            WHERE search_id = $1
              AND job_type = $2
              AND status IN ('pending', 'running')
            "#,
        )
        .bind(search_id)
        .bind(job_type)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Crawl and enrichment jobs still pending or running for a search.
    pub async fn active_stage_counts<'e, E>(
        search_id: SearchId,
        executor: E,
    ) -> Result<ActiveStageCounts>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, ActiveStageCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE job_type = 'crawl') AS crawl,
                COUNT(*) FILTER (WHERE job_type = 'enrichment') AS enrichment
            FROM jobs
            WHERE search_id = $1
              AND status IN ('pending', 'running')
            "#,
        )
        .bind(search_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }
}
