//! Integration tests for the job queue protocol:
//! - claim ordering and scheduling
//! - single-claim under concurrency
//! - conditional complete/fail
//! - retry rows written with the failure, and the stale-lease sweep

mod common;

use std::collections::HashSet;
use std::time::Duration;

use crate::common::{backdate_start, enqueue, insert_search, TestHarness};
use chrono::Utc;
use leadgen_core::common::MemberId;
use leadgen_core::kernel::jobs::{
    Job, JobQueue, JobStatus, JobType, NewJob, PostgresJobQueue, RetryPolicy,
};
use test_context::test_context;
use uuid::Uuid;

fn queue(ctx: &TestHarness) -> PostgresJobQueue {
    PostgresJobQueue::new(ctx.db_pool.clone())
}

// =============================================================================
// Claim
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_on_empty_queue_returns_none(ctx: &TestHarness) {
    assert!(queue(ctx).claim_next().await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_orders_by_priority_then_fifo(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let low = enqueue(&ctx.db_pool, JobType::Discovery, search.id, 0).await;
    let high_first = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    let high_second = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    let q = queue(ctx);

    let order: Vec<_> = [
        q.claim_next().await.unwrap().unwrap().id,
        q.claim_next().await.unwrap().unwrap().id,
        q.claim_next().await.unwrap().unwrap().id,
    ]
    .into();

    assert_eq!(order, vec![high_first.id, high_second.id, low.id]);
    assert!(q.claim_next().await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn claim_marks_running_and_counts_attempt(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let job = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);

    let claimed = queue(ctx).claim_next().await.unwrap().unwrap();

    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.attempts, 1);
    assert!(claimed.started_at.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn future_scheduled_job_is_not_claimed(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    NewJob::builder()
        .job_type(JobType::Crawl)
        .target_id(Uuid::now_v7())
        .search_id(search.id)
        .scheduled_at(Utc::now() + chrono::Duration::hours(1))
        .build()
        .insert(&ctx.db_pool)
        .await
        .unwrap();
    let due = NewJob::builder()
        .job_type(JobType::Crawl)
        .target_id(Uuid::now_v7())
        .search_id(search.id)
        .scheduled_at(Utc::now() - chrono::Duration::seconds(1))
        .build()
        .insert(&ctx.db_pool)
        .await
        .unwrap();
    let q = queue(ctx);

    assert_eq!(q.claim_next().await.unwrap().unwrap().id, due.id);
    assert!(q.claim_next().await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_never_share_a_job(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    for _ in 0..20 {
        enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    }

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let q = queue(ctx);
        tasks.push(tokio::spawn(async move { q.claim_next().await.unwrap() }));
    }

    let mut claimed = Vec::new();
    for task in tasks {
        if let Some(job) = task.await.unwrap() {
            claimed.push(job.id);
        }
    }

    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 20, "every job claimed exactly once");
    assert_eq!(unique.len(), 20, "no job handed to two claimers");
}

// =============================================================================
// Complete / Fail
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn complete_is_idempotent(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let q = queue(ctx);
    let job = q.claim_next().await.unwrap().unwrap();

    assert!(q.complete(job.id).await.unwrap());
    let done = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert!(!q.complete(job.id).await.unwrap());
    let again = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();

    assert_eq!(done.status, JobStatus::Done);
    assert!(done.finished_at.is_some());
    assert!(done.last_error.is_none());
    assert_eq!(again.finished_at, done.finished_at);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn fail_records_error_and_is_terminal(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Enrichment, search.id, 0).await;
    let q = queue(ctx);
    let job = q.claim_next().await.unwrap().unwrap();

    let failed = q.fail(job.id, "provider timed out", None).await.unwrap().unwrap();
    assert_eq!(failed.job.status, JobStatus::Failed);
    assert_eq!(failed.job.last_error.as_deref(), Some("provider timed out"));
    assert!(failed.retry.is_none());

    // Terminal jobs cannot move again
    assert!(!q.complete(job.id).await.unwrap());
    assert!(q.fail(job.id, "again", None).await.unwrap().is_none());
    let stored = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.as_deref(), Some("provider timed out"));

    // No automatic retry from the queue itself
    assert!(q.claim_next().await.unwrap().is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn pending_job_cannot_be_completed(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    let job = enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;

    assert!(!queue(ctx).complete(job.id).await.unwrap());
    let stored = Job::find_by_id(job.id, &ctx.db_pool).await.unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
}

// =============================================================================
// Retry rows and sweeping
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn fail_with_retry_creates_linked_pending_row(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    let q = queue(ctx);
    let job = q.claim_next().await.unwrap().unwrap();

    let run_at = Utc::now() + chrono::Duration::minutes(10);
    let failed = q.fail(job.id, "boom", Some(run_at)).await.unwrap().unwrap();
    let scheduled = failed.retry.unwrap();
    let retry = Job::find_by_id(scheduled.job_id, &ctx.db_pool).await.unwrap();

    assert_eq!(failed.job.status, JobStatus::Failed);
    assert_eq!(retry.status, JobStatus::Pending);
    assert_eq!(retry.retry_of, Some(job.id));
    assert_eq!(retry.attempts, 1);
    assert_eq!(retry.priority, 10);
    assert_eq!(retry.target_id, job.target_id);
    assert!(retry.scheduled_at.is_some());
    // Not eligible until run_at
    assert!(q.claim_next().await.unwrap().is_none());

    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn failing_a_finished_job_enqueues_no_retry(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let q = queue(ctx);
    let job = q.claim_next().await.unwrap().unwrap();
    q.complete(job.id).await.unwrap();

    let late = q.fail(job.id, "late failure", Some(Utc::now())).await.unwrap();

    assert!(late.is_none());
    let history = Job::find_by_search(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, JobStatus::Done);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn fail_stale_only_touches_expired_leases(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 0).await;
    let q = queue(ctx);
    let orphan = q.claim_next().await.unwrap().unwrap();
    let healthy = q.claim_next().await.unwrap().unwrap();
    backdate_start(&ctx.db_pool, orphan.id, chrono::Duration::minutes(30)).await;

    let swept = q
        .fail_stale(Duration::from_secs(15 * 60), &RetryPolicy::never())
        .await
        .unwrap();

    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].job.id, orphan.id);
    assert_eq!(swept[0].job.status, JobStatus::Failed);
    assert!(swept[0].job.last_error.as_deref().unwrap().contains("lease expired"));
    assert!(swept[0].retry.is_none());

    let healthy = Job::find_by_id(healthy.id, &ctx.db_pool).await.unwrap();
    assert_eq!(healthy.status, JobStatus::Running);

    // The orphan's worker finishing late cannot resurrect it
    assert!(!q.complete(orphan.id).await.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn active_counts_follow_job_lifecycle(ctx: &TestHarness) {
    let search = insert_search(&ctx.db_pool, MemberId::new()).await;
    enqueue(&ctx.db_pool, JobType::Enrichment, search.id, 20).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    enqueue(&ctx.db_pool, JobType::Crawl, search.id, 10).await;
    let q = queue(ctx);

    let counts = Job::active_stage_counts(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!((counts.crawl, counts.enrichment), (2, 1));

    let enrichment = q.claim_next().await.unwrap().unwrap();
    q.complete(enrichment.id).await.unwrap();
    let crawl = q.claim_next().await.unwrap().unwrap();

    let counts = Job::active_stage_counts(search.id, &ctx.db_pool).await.unwrap();
    assert_eq!((counts.crawl, counts.enrichment), (2, 0));

    q.fail(crawl.id, "no route to host", None).await.unwrap();
    let remaining =
        Job::count_active_for_search(search.id, JobType::Crawl, &ctx.db_pool).await.unwrap();
    assert_eq!(remaining, 1);
}
