//! Crawl stage: extract contacts for one company and hand off to enrichment.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{active_search, target_company};
use crate::domains::pipeline::models::{Company, Contact};
use crate::domains::searches::models::Search;
use crate::kernel::jobs::{Job, NewJob};
use crate::kernel::ServerDeps;

pub async fn run_crawl(job: &Job, deps: &ServerDeps) -> Result<()> {
    let Some(search) = active_search(job, deps).await? else {
        return Ok(());
    };
    let company = target_company(job, deps).await?;

    if company.crawled_at.is_some() {
        debug!(company_id = %company.id, "company already crawled");
        return Ok(());
    }

    let contacts = deps
        .contact_extractor
        .extract_contacts(&company.profile())
        .await
        .with_context(|| format!("contact extraction failed for {}", company.name))?;

    if contacts.is_empty() {
        Company::mark_crawled(company.id, &deps.db_pool).await?;
        info!(company_id = %company.id, search_id = %search.id, "crawl found no contacts");
        return Ok(());
    }

    let mut tx = deps.db_pool.begin().await?;
    let mut inserted = 0usize;
    for contact in &contacts {
        if Contact::insert_if_absent(company.id, search.id, contact, &mut *tx)
            .await?
            .is_some()
        {
            inserted += 1;
        }
    }
    NewJob::enrichment(company.id, search.id).insert(&mut *tx).await?;
    Company::mark_crawled(company.id, &mut *tx).await?;
    Search::increment_crawled(search.id, &mut *tx).await?;
    tx.commit().await?;

    info!(
        company_id = %company.id,
        search_id = %search.id,
        contacts = inserted,
        "crawl enqueued enrichment"
    );

    Ok(())
}
