//! Integration tests for workers, the retry policy, the sweeper and the runner.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{backdate_start, enqueue, insert_search, TestHarness};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadgen_core::common::{JobId, MemberId};
use leadgen_core::kernel::jobs::{
    sweep_stale_jobs, FailedJob, Job, JobHandler, JobOutcome, JobQueue, JobRunner, JobStatus,
    JobType, JobWorker, JobWorkerConfig, NewJob, PostgresJobQueue, RetryPolicy, RunnerConfig,
};
use leadgen_core::kernel::ServerDeps;
use test_context::test_context;

// =============================================================================
// Test handlers
// =============================================================================

#[derive(Default)]
struct RecordingHandler {
    fail: bool,
    executed: AtomicUsize,
    outcomes: Mutex<Vec<JobOutcome>>,
}

impl RecordingHandler {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn outcomes(&self) -> Vec<JobOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn execute(&self, job: &Job, _deps: &ServerDeps) -> Result<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("handler failed on attempt {}", job.attempts);
        }
        Ok(())
    }

    async fn after_job(&self, _job: &Job, outcome: &JobOutcome, _deps: &ServerDeps) -> Result<()> {
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}

/// Postgres queue whose first `failures` Done writes error out.
struct FlakyCompleteQueue {
    inner: PostgresJobQueue,
    failures: AtomicUsize,
}

impl FlakyCompleteQueue {
    fn new(ctx: &TestHarness, failures: usize) -> Self {
        Self {
            inner: PostgresJobQueue::new(ctx.db_pool.clone()),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl JobQueue for FlakyCompleteQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId> {
        self.inner.enqueue(job).await
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        self.inner.claim_next().await
    }

    async fn complete(&self, job_id: JobId) -> Result<bool> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("connection reset by peer");
        }
        self.inner.complete(job_id).await
    }

    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<FailedJob>> {
        self.inner.fail(job_id, error, retry_at).await
    }

    async fn fail_stale(
        &self,
        lease_timeout: Duration,
        retry_policy: &RetryPolicy,
    ) -> Result<Vec<FailedJob>> {
        self.inner.fail_stale(lease_timeout, retry_policy).await
    }
}

fn deps_with_queue(ctx: &TestHarness, queue: FlakyCompleteQueue) -> Arc<ServerDeps> {
    let mut deps = (*ctx.deps()).clone();
    deps.job_queue = Arc::new(queue);
    Arc::new(deps)
}

fn immediate_retries(max_attempts: i32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

fn worker(deps: Arc<ServerDeps>, handler: Arc<RecordingHandler>, retry_policy: RetryPolicy) -> JobWorker {
    JobWorker::new(
        deps,
        handler,
        JobWorkerConfig {
            retry_policy,
            jitter: Duration::ZERO,
            ..JobWorkerConfig::with_worker_id("test-worker")
        },
    )
}

// =============================================================================
// Worker
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn successful_job_is_completed(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let job = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let handler = Arc::new(RecordingHandler::default());
    let worker = worker(ctx.deps(), handler.clone(), RetryPolicy::default());

    assert!(worker.run_next_job().await.unwrap());
    assert!(!worker.run_next_job().await.unwrap());

    let stored = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert_eq!(stored.status, JobStatus::Done);
    assert_eq!(handler.outcomes(), vec![JobOutcome::Succeeded]);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn transient_done_write_error_is_retried(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let job = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let handler = Arc::new(RecordingHandler::default());
    let deps = deps_with_queue(ctx, FlakyCompleteQueue::new(ctx, 1));
    let worker = worker(deps, handler.clone(), RetryPolicy::default());

    assert!(worker.run_next_job().await.unwrap());

    let stored = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert_eq!(stored.status, JobStatus::Done);
    assert_eq!(handler.outcomes(), vec![JobOutcome::Succeeded]);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn post_job_hook_runs_when_done_write_keeps_failing(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let job = enqueue(&ctx.db_pool, JobType::Enrichment, search.id, 0).await;
    let handler = Arc::new(RecordingHandler::default());
    let deps = deps_with_queue(ctx, FlakyCompleteQueue::new(ctx, usize::MAX));
    let worker = worker(deps, handler.clone(), RetryPolicy::default());

    assert!(worker.run_next_job().await.unwrap());

    // Left for the sweeper, but the hook still saw the success
    let stored = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(handler.executed.load(Ordering::SeqCst), 1);
    assert_eq!(handler.outcomes(), vec![JobOutcome::Succeeded]);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failing_job_retries_until_attempts_exhausted(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    let handler = Arc::new(RecordingHandler::failing());
    let worker = worker(ctx.deps(), handler.clone(), immediate_retries(3));

    for _ in 0..3 {
        assert!(worker.run_next_job().await.unwrap());
    }
    assert!(!worker.run_next_job().await.unwrap());

    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|job| job.status == JobStatus::Failed));
    assert_eq!(
        history.iter().map(|job| job.attempts).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(history[1].retry_of, Some(history[0].id));
    assert_eq!(history[2].retry_of, Some(history[1].id));
    assert!(history[2]
        .last_error
        .as_deref()
        .unwrap()
        .contains("handler failed on attempt 3"));

    let outcomes = handler.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[0], JobOutcome::Retrying { .. }));
    assert!(matches!(outcomes[1], JobOutcome::Retrying { .. }));
    assert!(matches!(outcomes[2], JobOutcome::Failed { .. }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn retry_is_delayed_by_backoff(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Enrichment, search.id, 0).await;
    let handler = Arc::new(RecordingHandler::failing());
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(600),
    };
    let worker = worker(ctx.deps(), handler.clone(), policy);

    assert!(worker.run_next_job().await.unwrap());
    // The retry exists but is not eligible yet
    assert!(!worker.run_next_job().await.unwrap());

    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, JobStatus::Pending);
    assert!(history[1].scheduled_at.unwrap() > history[0].finished_at.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn never_policy_leaves_failure_terminal(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let handler = Arc::new(RecordingHandler::failing());
    let worker = worker(ctx.deps(), handler.clone(), RetryPolicy::never());

    assert!(worker.run_next_job().await.unwrap());

    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(matches!(handler.outcomes()[0], JobOutcome::Failed { .. }));
}

// =============================================================================
// Sweeper
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn sweep_fails_orphan_and_schedules_retry(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let deps = ctx.deps();
    let orphan = deps.job_queue.claim_next().await.unwrap().unwrap();
    backdate_start(&ctx.db_pool, orphan.id, chrono::Duration::hours(1)).await;
    let handler = Arc::new(RecordingHandler::default());

    let swept = sweep_stale_jobs(
        deps.clone(),
        handler.clone(),
        immediate_retries(3),
        Duration::from_secs(900),
    )
    .await
    .unwrap();

    assert_eq!(swept, 1);
    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, JobStatus::Failed);
    assert_eq!(history[1].status, JobStatus::Pending);
    assert_eq!(history[1].retry_of, Some(orphan.id));
    assert!(matches!(handler.outcomes()[0], JobOutcome::Retrying { .. }));

    // Nothing left to sweep
    let swept = sweep_stale_jobs(deps, handler, immediate_retries(3), Duration::from_secs(900))
        .await
        .unwrap();
    assert_eq!(swept, 0);
}

// =============================================================================
// Runner
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_drains_queue_with_several_workers(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    for _ in 0..12 {
        enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    }
    let handler = Arc::new(RecordingHandler::default());
    let config = RunnerConfig {
        worker_count: 3,
        poll_jitter: Duration::ZERO,
        shutdown_when_queue_empty: true,
        ..Default::default()
    };

    JobRunner::new(ctx.deps(), handler.clone(), config)
        .start()
        .wait_for_shutdown()
        .await;

    assert_eq!(handler.executed.load(Ordering::SeqCst), 12);
    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert!(history.iter().all(|job| job.status == JobStatus::Done));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn runner_shuts_down_while_idle(ctx: &TestHarness) {
    let handler = Arc::new(RecordingHandler::default());
    let config = RunnerConfig {
        worker_count: 2,
        poll_interval: Duration::from_secs(30),
        ..Default::default()
    };

    let handle = JobRunner::new(ctx.deps(), handler.clone(), config).start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("runner did not stop after cancellation");
    assert_eq!(handler.executed.load(Ordering::SeqCst), 0);
}
