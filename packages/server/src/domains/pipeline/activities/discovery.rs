//! Discovery stage: one search fans out into one crawl job per company.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::active_search;
use crate::domains::pipeline::models::Company;
use crate::domains::searches::models::Search;
use crate::kernel::jobs::{Job, NewJob};
use crate::kernel::ServerDeps;

pub async fn run_discovery(job: &Job, deps: &ServerDeps) -> Result<()> {
    let Some(search) = active_search(job, deps).await? else {
        return Ok(());
    };

    if search.discovered_count > 0 {
        debug!(search_id = %search.id, "search already discovered");
        return Ok(());
    }

    if Search::mark_running(search.id, &deps.db_pool).await? {
        info!(search_id = %search.id, "search running");
    }

    let limit = usize::try_from(search.max_results).unwrap_or(0);
    let mut companies = deps
        .lead_search
        .discover(&search.query, limit)
        .await
        .context("lead search failed")?;
    companies.truncate(limit);

    if companies.is_empty() {
        // The completion tracker ignores searches with nothing discovered
        Search::mark_done(search.id, &deps.db_pool).await?;
        info!(search_id = %search.id, "discovery found no companies, search done");
        return Ok(());
    }

    let mut tx = deps.db_pool.begin().await?;
    // Serializes against a concurrent run of the same discovery and against
    // the search failing while the lead search was in flight
    let Some(locked) = Search::find_for_update(search.id, &mut *tx).await? else {
        return Ok(());
    };
    if locked.status.is_terminal() || locked.discovered_count > 0 {
        debug!(search_id = %search.id, status = ?locked.status, "search changed during discovery");
        return Ok(());
    }

    for profile in &companies {
        let company = Company::insert(search.id, profile, &mut *tx).await?;
        NewJob::crawl(company.id, search.id).insert(&mut *tx).await?;
    }
    Search::add_discovered(search.id, companies.len() as i32, &mut *tx).await?;
    tx.commit().await?;

    info!(
        search_id = %search.id,
        discovered = companies.len(),
        "discovery enqueued crawl jobs"
    );

    Ok(())
}
