//! Enrichment stage: classify the company, then deliver its contacts as
//! billable leads.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{active_search, target_company};
use crate::domains::credits::{deliver_leads, CreditError, LeadContact};
use crate::domains::pipeline::models::{Company, Contact};
use crate::domains::searches::models::Search;
use crate::kernel::jobs::Job;
use crate::kernel::{ExtractedContact, ServerDeps};

pub async fn run_enrichment(job: &Job, deps: &ServerDeps) -> Result<()> {
    let Some(search) = active_search(job, deps).await? else {
        return Ok(());
    };
    let company = target_company(job, deps).await?;

    if company.enriched_at.is_some() {
        debug!(company_id = %company.id, "company already enriched");
        return Ok(());
    }

    let contacts = Contact::find_by_company(company.id, &deps.db_pool).await?;
    let extracted: Vec<ExtractedContact> = contacts.iter().map(Contact::extracted).collect();

    let enrichment = deps
        .lead_enricher
        .enrich(&company.profile(), &extracted)
        .await
        .with_context(|| format!("enrichment failed for {}", company.name))?;

    let leads: Vec<LeadContact> = contacts
        .iter()
        .map(|contact| contact.as_lead(company.lead_company()))
        .collect();

    // The enrichment stamp, the delivery and the counter commit together, so
    // a retry either finds the company enriched or starts from scratch
    let mut tx = deps.db_pool.begin().await?;
    if !Company::apply_enrichment(company.id, &enrichment, &mut *tx).await? {
        debug!(company_id = %company.id, "company enriched concurrently");
        return Ok(());
    }

    match deliver_leads(search.owner_id, search.id, &leads, &mut *tx).await {
        Ok(delivery) => {
            debug!(
                company_id = %company.id,
                net_new = delivery.total_net_new,
                deduped = delivery.total_deduped,
                "leads delivered for company"
            );
        }
        Err(CreditError::InsufficientCredits {
            required,
            available,
        }) => {
            // Retrying cannot create credits; the leads stay undelivered
            warn!(
                company_id = %company.id,
                search_id = %search.id,
                owner_id = %search.owner_id,
                required,
                available,
                "insufficient credits, leads not delivered"
            );
        }
        Err(e) => return Err(e).context("lead delivery failed"),
    }

    Search::increment_enriched(search.id, &mut *tx).await?;
    tx.commit().await?;

    info!(company_id = %company.id, search_id = %search.id, "company enriched");

    Ok(())
}
