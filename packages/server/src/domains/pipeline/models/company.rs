use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::common::{CompanyId, SearchId};
use crate::domains::credits::LeadCompany;
use crate::kernel::{CompanyEnrichment, CompanyProfile};

/// Company model - the target entity of crawl and enrichment jobs
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Company {
    pub id: CompanyId,
    pub search_id: SearchId,
    pub name: String,
    pub domain: Option<String>,
    pub website_url: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub place_id: Option<String>,

    // Filled by enrichment
    pub industry: Option<String>,
    pub summary: Option<String>,

    pub crawled_at: Option<DateTime<Utc>>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub async fn insert<'e, E>(search_id: SearchId, profile: &CompanyProfile, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO companies (id, search_id, name, domain, website_url, city, country, place_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(CompanyId::new())
        .bind(search_id)
        .bind(&profile.name)
        .bind(&profile.domain)
        .bind(&profile.website_url)
        .bind(&profile.city)
        .bind(&profile.country)
        .bind(&profile.place_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id<'e, E>(id: CompanyId, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_search<'e, E>(search_id: SearchId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM companies WHERE search_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(search_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_crawled<'e, E>(id: CompanyId, executor: E) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE companies SET crawled_at = COALESCE(crawled_at, NOW()), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Stamp the company enriched. Returns false if it already was.
    pub async fn apply_enrichment<'e, E>(
        id: CompanyId,
        enrichment: &CompanyEnrichment,
        executor: E,
    ) -> Result<bool>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET industry = COALESCE($2, industry),
                summary = COALESCE($3, summary),
                enriched_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND enriched_at IS NULL
            "#,
        )
        .bind(id)
        .bind(&enrichment.industry)
        .bind(&enrichment.summary)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub fn profile(&self) -> CompanyProfile {
        CompanyProfile {
            name: self.name.clone(),
            domain: self.domain.clone(),
            website_url: self.website_url.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            place_id: self.place_id.clone(),
        }
    }

    /// The identity fields the credit ledger keys leads on
    pub fn lead_company(&self) -> LeadCompany {
        LeadCompany {
            domain: self.domain.clone(),
            website_url: self.website_url.clone(),
            name: self.name.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            place_id: self.place_id.clone(),
        }
    }
}
