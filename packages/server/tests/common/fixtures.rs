//! Shared fixtures for integration tests.

use chrono::{Duration, Utc};
use leadgen_core::common::{JobId, MemberId, SearchId};
use leadgen_core::domains::credits::{LeadCompany, LeadContact};
use leadgen_core::domains::searches::models::Search;
use leadgen_core::kernel::jobs::{Job, JobStatus, JobType, NewJob};
use sqlx::PgPool;
use uuid::Uuid;

/// A contact at a company identified by its domain.
pub fn lead_at(email: &str, domain: &str) -> LeadContact {
    LeadContact {
        contact_id: None,
        email: email.to_string(),
        company: LeadCompany {
            domain: Some(domain.to_string()),
            name: domain.to_string(),
            ..Default::default()
        },
    }
}

/// Insert a search directly (no discovery job).
pub async fn insert_search(pool: &PgPool, owner_id: MemberId) -> Search {
    Search::insert(owner_id, "dentists in minneapolis", 10, pool)
        .await
        .expect("Failed to insert search")
}

/// Insert a search and move it to Running.
pub async fn insert_running_search(pool: &PgPool, owner_id: MemberId) -> Search {
    let search = insert_search(pool, owner_id).await;
    assert!(Search::mark_running(search.id, pool).await.unwrap());
    Search::find_by_id(search.id, pool).await.unwrap()
}

/// Enqueue a bare job of the given type for a search.
pub async fn enqueue(pool: &PgPool, job_type: JobType, search_id: SearchId, priority: i32) -> Job {
    NewJob::builder()
        .job_type(job_type)
        .target_id(Uuid::now_v7())
        .search_id(search_id)
        .priority(priority)
        .build()
        .insert(pool)
        .await
        .expect("Failed to enqueue job")
}

/// Pretend a running job was claimed `age` ago.
pub async fn backdate_start(pool: &PgPool, job_id: JobId, age: Duration) {
    sqlx::query("UPDATE jobs SET started_at = $2 WHERE id = $1")
        .bind(job_id)
        .bind(Utc::now() - age)
        .execute(pool)
        .await
        .expect("Failed to backdate job");
}

/// Force a job's status, bypassing the queue protocol.
pub async fn set_job_status(pool: &PgPool, job_id: JobId, status: JobStatus) {
    sqlx::query("UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(status)
        .execute(pool)
        .await
        .expect("Failed to set job status");
}

/// Wait until some session on this database is blocked on a lock.
pub async fn wait_for_lock_waiter(pool: &PgPool) {
    for _ in 0..500 {
        let waiting: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM pg_stat_activity
            WHERE datname = current_database() AND wait_event_type = 'Lock'
            "#,
        )
        .fetch_one(pool)
        .await
        .expect("Failed to read pg_stat_activity");
        if waiting > 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("no session blocked on a lock");
}
