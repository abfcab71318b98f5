// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    BaseContactExtractor, BaseLeadEnricher, BaseLeadSearch, CompanyEnrichment, CompanyProfile,
    ExtractedContact, ServerDeps,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mock Lead Search
// =============================================================================

pub struct MockLeadSearch {
    companies: Vec<CompanyProfile>,
    fail_with: Option<String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockLeadSearch {
    pub fn new() -> Self {
        Self {
            companies: Vec::new(),
            fail_with: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Companies returned for every query (truncated to the requested limit)
    pub fn with_companies(mut self, companies: Vec<CompanyProfile>) -> Self {
        self.companies = companies;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Get all (query, limit) pairs that were searched
    pub fn queries(&self) -> Vec<(String, usize)> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl BaseLeadSearch for MockLeadSearch {
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<CompanyProfile>> {
        lock(&self.queries).push((query.to_string(), limit));

        if let Some(message) = &self.fail_with {
            bail!("{}", message);
        }
        Ok(self.companies.iter().take(limit).cloned().collect())
    }
}

// =============================================================================
// Mock Contact Extractor
// =============================================================================

pub struct MockContactExtractor {
    contacts: HashMap<String, Vec<ExtractedContact>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockContactExtractor {
    pub fn new() -> Self {
        Self {
            contacts: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Contacts returned for the company with this name (others get none)
    pub fn with_contacts(mut self, company_name: &str, emails: &[&str]) -> Self {
        self.contacts.insert(
            company_name.to_string(),
            emails.iter().map(|email| ExtractedContact::new(*email)).collect(),
        );
        self
    }

    /// Every crawl of the company with this name fails
    pub fn failing_for(mut self, company_name: &str) -> Self {
        self.failing.insert(company_name.to_string());
        self
    }

    /// Get the company names that were crawled, in call order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, company_name: &str) -> usize {
        lock(&self.calls).iter().filter(|name| *name == company_name).count()
    }
}

#[async_trait]
impl BaseContactExtractor for MockContactExtractor {
    async fn extract_contacts(&self, company: &CompanyProfile) -> Result<Vec<ExtractedContact>> {
        lock(&self.calls).push(company.name.clone());

        if self.failing.contains(&company.name) {
            bail!("crawl failed for {}", company.name);
        }
        Ok(self.contacts.get(&company.name).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Mock Lead Enricher
// =============================================================================

pub struct MockLeadEnricher {
    enrichment: CompanyEnrichment,
    fail_with: Option<String>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl MockLeadEnricher {
    pub fn new() -> Self {
        Self {
            enrichment: CompanyEnrichment {
                industry: Some("Software".to_string()),
                summary: Some("Mock enrichment summary".to_string()),
            },
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_enrichment(mut self, enrichment: CompanyEnrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Get (company name, contact count) for every enrich call
    pub fn calls(&self) -> Vec<(String, usize)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl BaseLeadEnricher for MockLeadEnricher {
    async fn enrich(
        &self,
        company: &CompanyProfile,
        contacts: &[ExtractedContact],
    ) -> Result<CompanyEnrichment> {
        lock(&self.calls).push((company.name.clone(), contacts.len()));

        if let Some(message) = &self.fail_with {
            bail!("{}", message);
        }
        Ok(self.enrichment.clone())
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub lead_search: Arc<MockLeadSearch>,
    pub contact_extractor: Arc<MockContactExtractor>,
    pub lead_enricher: Arc<MockLeadEnricher>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            lead_search: Arc::new(MockLeadSearch::new()),
            contact_extractor: Arc::new(MockContactExtractor::new()),
            lead_enricher: Arc::new(MockLeadEnricher::new()),
        }
    }

    /// Set a mock lead search
    pub fn mock_search(mut self, search: MockLeadSearch) -> Self {
        self.lead_search = Arc::new(search);
        self
    }

    /// Set a mock contact extractor
    pub fn mock_extractor(mut self, extractor: MockContactExtractor) -> Self {
        self.contact_extractor = Arc::new(extractor);
        self
    }

    /// Set a mock lead enricher
    pub fn mock_enricher(mut self, enricher: MockLeadEnricher) -> Self {
        self.lead_enricher = Arc::new(enricher);
        self
    }

    /// Convert into ServerDeps for testing
    pub fn into_server_deps(self, db_pool: PgPool) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            db_pool,
            self.lead_search,
            self.contact_extractor,
            self.lead_enricher,
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MockLeadSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MockContactExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MockLeadEnricher {
    fn default() -> Self {
        Self::new()
    }
}
