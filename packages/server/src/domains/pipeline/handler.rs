//! Dispatch from job type to stage handler, plus the post-job hooks that
//! keep searches moving toward a terminal state.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::activities::{run_crawl, run_discovery, run_enrichment};
use crate::domains::searches::activities::maybe_mark_done;
use crate::domains::searches::models::Search;
use crate::kernel::jobs::{Job, JobHandler, JobOutcome, JobType};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineHandler;

#[async_trait]
impl JobHandler for PipelineHandler {
    async fn execute(&self, job: &Job, deps: &ServerDeps) -> Result<()> {
        match job.job_type {
            JobType::Discovery => run_discovery(job, deps).await,
            JobType::Crawl => run_crawl(job, deps).await,
            JobType::Enrichment => run_enrichment(job, deps).await,
        }
    }

    async fn after_job(&self, job: &Job, outcome: &JobOutcome, deps: &ServerDeps) -> Result<()> {
        let Some(search_id) = job.search_id else {
            return Ok(());
        };

        match job.job_type {
            JobType::Discovery => {
                let JobOutcome::Failed { error } = outcome else {
                    return Ok(());
                };
                // With nothing fanned out, nothing else can finish the search.
                // A discovery that committed its crawl jobs before failing
                // (e.g. a lease expiry) leaves them to the completion tracker.
                if Search::mark_failed_undiscovered(search_id, error, &deps.db_pool).await? {
                    warn!(search_id = %search_id, error = %error, "search failed in discovery");
                } else {
                    debug!(search_id = %search_id, "discovery failed after fan-out, search continues");
                    maybe_mark_done(search_id, &deps.db_pool).await?;
                }
            }
            JobType::Crawl | JobType::Enrichment => {
                maybe_mark_done(search_id, &deps.db_pool).await?;
            }
        }

        Ok(())
    }
}
