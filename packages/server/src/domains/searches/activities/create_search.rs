//! Create search action

use tracing::info;

use crate::common::MemberId;
use crate::domains::searches::errors::SearchError;
use crate::domains::searches::models::Search;
use crate::kernel::jobs::NewJob;
use crate::kernel::ServerDeps;

/// Create a Pending search and enqueue its Discovery job.
///
/// Both rows commit together: a search is never visible without the job
/// that will drive it.
pub async fn create_search(
    owner_id: MemberId,
    query: &str,
    max_results: i32,
    deps: &ServerDeps,
) -> Result<Search, SearchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::InvalidQuery);
    }
    if max_results <= 0 {
        return Err(SearchError::InvalidMaxResults(max_results));
    }

    let mut tx = deps.db_pool.begin().await?;
    let search = Search::insert(owner_id, query, max_results, &mut *tx).await?;
    let job = NewJob::discovery(search.id).insert(&mut *tx).await?;
    tx.commit().await?;

    info!(
        search_id = %search.id,
        owner_id = %owner_id,
        job_id = %job.id,
        max_results,
        "search created"
    );

    Ok(search)
}
