//! Stage handlers - one per job type
//!
//! Each handler reads its target, calls one collaborator, and commits its
//! output together with the follow-on jobs and the counter bump. A handler
//! that finds its work already recorded returns early, so a re-claimed job
//! is safe to run again.

mod crawl;
mod discovery;
mod enrichment;

pub use crawl::run_crawl;
pub use discovery::run_discovery;
pub use enrichment::run_enrichment;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::domains::pipeline::models::Company;
use crate::domains::searches::models::Search;
use crate::kernel::jobs::Job;
use crate::kernel::ServerDeps;

/// The job's search, or `None` when it already reached a terminal state and
/// the job should be skipped.
async fn active_search(job: &Job, deps: &ServerDeps) -> Result<Option<Search>> {
    let search_id = job
        .search_id
        .ok_or_else(|| anyhow!("{} job {} has no search", job.job_type, job.id))?;
    let search = Search::find_by_id(search_id, &deps.db_pool)
        .await
        .with_context(|| format!("search {} not found", search_id))?;

    if search.status.is_terminal() {
        info!(search_id = %search_id, status = ?search.status, "search finished, skipping job");
        return Ok(None);
    }
    Ok(Some(search))
}

async fn target_company(job: &Job, deps: &ServerDeps) -> Result<Company> {
    let company_id = job
        .company_id()
        .ok_or_else(|| anyhow!("{} job {} does not target a company", job.job_type, job.id))?;
    Company::find_by_id(company_id, &deps.db_pool)
        .await
        .with_context(|| format!("company {} not found", company_id))
}
