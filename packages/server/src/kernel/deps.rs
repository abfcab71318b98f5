//! Server dependencies for job handlers (using traits for testability)
//!
//! This is the one context object handed to every handler. It is built once
//! at start-up; tests build their own with mocks via `TestDependencies`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::kernel::jobs::{JobQueue, PostgresJobQueue};
use crate::kernel::{
    BaseContactExtractor, BaseLeadEnricher, BaseLeadSearch, CompanyEnrichment, CompanyProfile,
    ExtractedContact,
};

// =============================================================================
// ServerDeps
// =============================================================================

#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
    pub lead_search: Arc<dyn BaseLeadSearch>,
    pub contact_extractor: Arc<dyn BaseContactExtractor>,
    pub lead_enricher: Arc<dyn BaseLeadEnricher>,
}

impl ServerDeps {
    /// Create new ServerDeps backed by the Postgres job queue
    pub fn new(
        db_pool: PgPool,
        lead_search: Arc<dyn BaseLeadSearch>,
        contact_extractor: Arc<dyn BaseContactExtractor>,
        lead_enricher: Arc<dyn BaseLeadEnricher>,
    ) -> Self {
        Self {
            job_queue: Arc::new(PostgresJobQueue::new(db_pool.clone())),
            db_pool,
            lead_search,
            contact_extractor,
            lead_enricher,
        }
    }

    /// Dependencies for operator tooling that never runs stage handlers.
    /// Any collaborator call fails with an error.
    pub fn without_collaborators(db_pool: PgPool) -> Self {
        let unconfigured = Arc::new(Unconfigured);
        Self::new(db_pool, unconfigured.clone(), unconfigured.clone(), unconfigured)
    }
}

/// Open the connection pool described by `config`.
pub async fn connect(config: &Config) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

// =============================================================================
// Unconfigured collaborators
// =============================================================================

struct Unconfigured;

#[async_trait]
impl BaseLeadSearch for Unconfigured {
    async fn discover(&self, _query: &str, _limit: usize) -> Result<Vec<CompanyProfile>> {
        bail!("no lead search provider configured")
    }
}

#[async_trait]
impl BaseContactExtractor for Unconfigured {
    async fn extract_contacts(&self, _company: &CompanyProfile) -> Result<Vec<ExtractedContact>> {
        bail!("no contact extractor configured")
    }
}

#[async_trait]
impl BaseLeadEnricher for Unconfigured {
    async fn enrich(
        &self,
        _company: &CompanyProfile,
        _contacts: &[ExtractedContact],
    ) -> Result<CompanyEnrichment> {
        bail!("no lead enricher configured")
    }
}
