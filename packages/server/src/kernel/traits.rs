// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only: provider calls with no pipeline logic.
// Stage handlers in domains/pipeline decide what to do with the results.
//
// Naming convention: Base* for trait names (e.g., BaseLeadSearch)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Provider payloads
// =============================================================================

/// A company as seen by the providers: what discovery returns and what the
/// crawl and enrichment stages are handed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub domain: Option<String>,
    pub website_url: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    /// Location-provider identifier (e.g. a maps place id)
    pub place_id: Option<String>,
}

impl CompanyProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_website(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContact {
    pub email: String,
    pub name: Option<String>,
    pub title: Option<String>,
}

impl ExtractedContact {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEnrichment {
    pub industry: Option<String>,
    pub summary: Option<String>,
}

// =============================================================================
// Lead Search Trait (Infrastructure - discovery provider)
// =============================================================================

#[async_trait]
pub trait BaseLeadSearch: Send + Sync {
    /// Find up to `limit` companies matching a free-text query
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<CompanyProfile>>;
}

// =============================================================================
// Contact Extractor Trait (Infrastructure - crawling + HTML extraction)
// =============================================================================

#[async_trait]
pub trait BaseContactExtractor: Send + Sync {
    /// Crawl the company's web presence and return the contacts found.
    /// An empty list is a valid result.
    async fn extract_contacts(&self, company: &CompanyProfile) -> Result<Vec<ExtractedContact>>;
}

// =============================================================================
// Lead Enricher Trait (Infrastructure - AI classification)
// =============================================================================

#[async_trait]
pub trait BaseLeadEnricher: Send + Sync {
    async fn enrich(
        &self,
        company: &CompanyProfile,
        contacts: &[ExtractedContact],
    ) -> Result<CompanyEnrichment>;
}
