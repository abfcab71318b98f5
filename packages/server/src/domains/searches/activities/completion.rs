//! Completion tracking for multi-stage searches.
//!
//! Called after every crawl or enrichment job settles. Counters alone can
//! under-count (a crawl that finds no contacts never bumps `crawled_count`),
//! so the remaining-job counts are the fallback that lets a search finish.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::common::SearchId;
use crate::domains::searches::models::{Search, SearchStatus};
use crate::kernel::jobs::Job;

/// Flip the search to Done if its fan-out has settled. Returns true only for
/// the call that performed the transition.
///
/// The search row stays locked while the settled check runs, and the check
/// reads counters and remaining jobs in one statement.
pub async fn maybe_mark_done(search_id: SearchId, pool: &PgPool) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let Some(search) = Search::find_for_update(search_id, &mut *tx).await? else {
        return Ok(false);
    };
    if search.status != SearchStatus::Running {
        return Ok(false);
    }

    let transitioned = Search::mark_done_if_settled(search_id, &mut *tx).await?;
    tx.commit().await?;

    if transitioned {
        info!(
            search_id = %search_id,
            discovered = search.discovered_count,
            crawled = search.crawled_count,
            enriched = search.enriched_count,
            "search completed"
        );
    } else {
        let active = Job::active_stage_counts(search_id, pool).await?;
        debug!(
            search_id = %search_id,
            discovered = search.discovered_count,
            crawled = search.crawled_count,
            enriched = search.enriched_count,
            active_crawls = active.crawl,
            active_enrichments = active.enrichment,
            "search still in progress"
        );
    }
    Ok(transitioned)
}
