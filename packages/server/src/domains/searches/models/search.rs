use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

use crate::common::{MemberId, SearchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "search_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl SearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SearchStatus::Done | SearchStatus::Failed)
    }
}

/// Search model - one user discovery request and its fan-out progress
///
/// Counters and rollups only ever increase. Status leaves Running at most
/// once and never comes back.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Search {
    pub id: SearchId,
    pub owner_id: MemberId,
    pub query: String,
    pub max_results: i32,
    pub status: SearchStatus,
    pub error_message: Option<String>,

    // Stage counters
    pub discovered_count: i32,
    pub crawled_count: i32,
    pub enriched_count: i32,

    // Lead ledger rollups
    pub total_found: i32,
    pub total_deduped: i32,
    pub total_net_new: i32,
    pub credits_charged: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-delivery additions to a search's lead rollups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeadRollup {
    pub found: i32,
    pub deduped: i32,
    pub net_new: i32,
    pub credits_charged: i32,
}

impl Search {
    /// Insert a Pending search with zeroed counters.
    pub async fn insert<'e, E>(
        owner_id: MemberId,
        query: &str,
        max_results: i32,
        executor: E,
    ) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO searches (id, owner_id, query, max_results, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(SearchId::new())
        .bind(owner_id)
        .bind(query)
        .bind(max_results)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id<'e, E>(id: SearchId, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM searches WHERE id = $1")
            .bind(id)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_optional<'e, E>(id: SearchId, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM searches WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Row-lock the search for the rest of the transaction.
    pub async fn find_for_update<'e, E>(id: SearchId, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM searches WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Searches for one owner, newest first
    pub async fn find_by_owner<'e, E>(owner_id: MemberId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM searches WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Pending -> Running. Returns false if the search was not pending.
    pub async fn mark_running<'e, E>(id: SearchId, executor: E) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE searches
            SET status = 'running', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Running -> Done. The single conditional update makes concurrent
    /// callers race safely: exactly one of them sees `true`.
    pub async fn mark_done<'e, E>(id: SearchId, executor: E) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE searches
            SET status = 'done', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Running -> Done, but only if every unit of fan-out work is accounted
    /// for. Counters and remaining jobs are read by the same statement, so a
    /// stage commit can never be observed half-way.
    ///
    /// A stage is settled when its counter caught up with the stage before it,
    /// or when none of its jobs are pending or running (a crawl that finds no
    /// contacts never bumps `crawled_count`, and permanently failed jobs never
    /// bump anything).
    pub async fn mark_done_if_settled<'e, E>(id: SearchId, executor: E) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE searches s
            SET status = 'done', completed_at = NOW(), updated_at = NOW()
            WHERE s.id = $1
              AND s.status = 'running'
              AND s.discovered_count > 0
              AND (
                s.crawled_count >= s.discovered_count
                OR NOT EXISTS (
                    SELECT 1 FROM jobs j
                    WHERE j.search_id = s.id
                      AND j.job_type = 'crawl'
                      AND j.status IN ('pending', 'running')
                )
              )
              AND (
                s.enriched_count >= s.crawled_count
                OR NOT EXISTS (
                    SELECT 1 FROM jobs j
                    WHERE j.search_id = s.id
                      AND j.job_type = 'enrichment'
                      AND j.status IN ('pending', 'running')
                )
              )
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending/Running -> Failed, only while nothing has been discovered.
    /// Once crawl jobs exist the search finishes through the completion
    /// tracker instead.
    pub async fn mark_failed_undiscovered<'e, E>(
        id: SearchId,
        error: &str,
        executor: E,
    ) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE searches
            SET status = 'failed', error_message = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running') AND discovered_count = 0
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending/Running -> Failed with an error message.
    pub async fn mark_failed<'e, E>(id: SearchId, error: &str, executor: E) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE searches
            SET status = 'failed', error_message = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn add_discovered<'e, E>(id: SearchId, count: i32, executor: E) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE searches SET discovered_count = discovered_count + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(count.max(0))
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn increment_crawled<'e, E>(id: SearchId, executor: E) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE searches SET crawled_count = crawled_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn increment_enriched<'e, E>(id: SearchId, executor: E) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE searches SET enriched_count = enriched_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn add_lead_rollup<'e, E>(id: SearchId, rollup: &LeadRollup, executor: E) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE searches
            SET total_found = total_found + $2,
                total_deduped = total_deduped + $3,
                total_net_new = total_net_new + $4,
                credits_charged = credits_charged + $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(rollup.found)
        .bind(rollup.deduped)
        .bind(rollup.net_new)
        .bind(rollup.credits_charged)
        .execute(executor)
        .await?;
        Ok(())
    }
}

/// Read-only projection returned to callers polling a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchStatusView {
    pub id: SearchId,
    pub status: SearchStatus,
    pub error_message: Option<String>,
    pub discovered_count: i32,
    pub crawled_count: i32,
    pub enriched_count: i32,
    pub total_found: i32,
    pub total_deduped: i32,
    pub total_net_new: i32,
    pub credits_charged: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Search> for SearchStatusView {
    fn from(search: Search) -> Self {
        Self {
            id: search.id,
            status: search.status,
            error_message: search.error_message,
            discovered_count: search.discovered_count,
            crawled_count: search.crawled_count,
            enriched_count: search.enriched_count,
            total_found: search.total_found,
            total_deduped: search.total_deduped,
            total_net_new: search.total_net_new,
            credits_charged: search.credits_charged,
            created_at: search.created_at,
            completed_at: search.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!SearchStatus::Pending.is_terminal());
        assert!(!SearchStatus::Running.is_terminal());
        assert!(SearchStatus::Done.is_terminal());
        assert!(SearchStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SearchStatus::Running).unwrap(), "\"running\"");
    }
}
