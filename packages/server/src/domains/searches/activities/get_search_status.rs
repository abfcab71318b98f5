use crate::common::SearchId;
use crate::domains::searches::errors::SearchError;
use crate::domains::searches::models::{Search, SearchStatusView};
use crate::kernel::ServerDeps;

/// Status and counters for one search.
pub async fn get_search_status(
    search_id: SearchId,
    deps: &ServerDeps,
) -> Result<SearchStatusView, SearchError> {
    Search::find_optional(search_id, &deps.db_pool)
        .await?
        .map(SearchStatusView::from)
        .ok_or(SearchError::NotFound(search_id))
}
