//! Job worker loop.
//!
//! Each `JobWorker` is an independent loop; workers share nothing in-process
//! and coordinate only through the queue's atomic claim.
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► claim_next() ── none ──► sleep(poll_interval + jitter)
//!     ├─► JobHandler::execute(job)
//!     ├─► complete / fail (+ retry row when RetryPolicy allows)
//!     └─► JobHandler::after_job(job, outcome)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use super::handler::{JobHandler, JobOutcome};
use super::job::Job;
use super::queue::FailedJob;
use super::retry::RetryPolicy;
use crate::common::JobId;
use crate::kernel::ServerDeps;

const COMPLETE_ATTEMPTS: u32 = 3;
const COMPLETE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Maximum random delay added to each idle poll
    pub jitter: Duration,
    pub retry_policy: RetryPolicy,
    /// Exit as soon as a claim finds nothing (draining, tests)
    pub shutdown_when_queue_empty: bool,
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            jitter: Duration::from_millis(100),
            retry_policy: RetryPolicy::default(),
            shutdown_when_queue_empty: false,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    fn sleep_duration(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        self.poll_interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

pub struct JobWorker {
    deps: Arc<ServerDeps>,
    handler: Arc<dyn JobHandler>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(deps: Arc<ServerDeps>, handler: Arc<dyn JobHandler>, config: JobWorkerConfig) -> Self {
        Self {
            deps,
            handler,
            config,
        }
    }

    /// Run until `shutdown` fires (or the queue is empty, if configured).
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = %self.config.worker_id, "job worker starting");

        while !shutdown.is_cancelled() {
            match self.run_next_job().await {
                Ok(true) => {}
                Ok(false) if self.config.shutdown_when_queue_empty => {
                    debug!("no eligible jobs, worker draining done");
                    break;
                }
                Ok(false) => {
                    let sleep_for = self.config.sleep_duration();
                    trace!(?sleep_for, "no eligible jobs");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(sleep_for) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.sleep_duration()) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
    }

    /// Claim and process one job. Returns whether a job was claimed.
    ///
    /// Only claim errors are returned; anything after the claim is recorded
    /// on the job and logged.
    pub async fn run_next_job(&self) -> Result<bool> {
        let Some(job) = self.deps.job_queue.claim_next().await? else {
            return Ok(false);
        };

        let span = info_span!(
            "job",
            "job.id" = %job.id,
            "job.type" = %job.job_type,
            "job.attempts" = job.attempts,
        );
        self.process_job(job).instrument(span).await;

        Ok(true)
    }

    async fn process_job(&self, job: Job) {
        debug!("running job");

        let outcome = match self.handler.execute(&job, &self.deps).await {
            Ok(()) => match self.complete(job.id).await {
                Ok(true) => {
                    info!("job succeeded");
                    Some(JobOutcome::Succeeded)
                }
                Ok(false) => {
                    // Swept while running; the sweeper already settled it
                    warn!("job finished after its lease expired");
                    None
                }
                Err(e) => {
                    // The handler's work is committed and post-job hooks are
                    // idempotent, so they still run
                    error!(error = %e, "failed to mark job as done");
                    Some(JobOutcome::Succeeded)
                }
            },
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(error = %message, "job failed");
                let retry_at = self.config.retry_policy.next_run_at(&job, Utc::now());
                match self.deps.job_queue.fail(job.id, &message, retry_at).await {
                    Ok(Some(failed)) => Some(failure_outcome(&failed)),
                    Ok(None) => {
                        warn!("job failed after its lease expired");
                        None
                    }
                    Err(e) => {
                        error!(error = %e, "failed to mark job as failed");
                        None
                    }
                }
            }
        };

        if let Some(outcome) = outcome {
            if let Err(e) = self.handler.after_job(&job, &outcome, &self.deps).await {
                error!(error = %e, "post-job hook failed");
            }
        }
    }
}

impl JobWorker {
    /// `JobQueue::complete` with a few quick retries for transient storage errors.
    async fn complete(&self, job_id: JobId) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.deps.job_queue.complete(job_id).await {
                Err(e) if attempt < COMPLETE_ATTEMPTS => {
                    warn!(error = %e, attempt, "failed to mark job as done, retrying");
                    tokio::time::sleep(COMPLETE_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Outcome reported to post-job hooks for a job that just moved to Failed.
pub(crate) fn failure_outcome(failed: &FailedJob) -> JobOutcome {
    match failed.retry {
        Some(retry) => JobOutcome::Retrying {
            retry_job_id: retry.job_id,
            run_at: retry.run_at,
        },
        None => {
            warn!(
                job_id = %failed.job.id,
                attempts = failed.job.attempts,
                "job failed permanently"
            );
            JobOutcome::Failed {
                error: failed.job.last_error.clone().unwrap_or_default(),
            }
        }
    }
}
