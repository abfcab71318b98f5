use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::common::{CompanyId, ContactId, SearchId};
use crate::domains::credits::{LeadCompany, LeadContact};
use crate::kernel::ExtractedContact;

/// Contact model - one person found while crawling a company
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Contact {
    pub id: ContactId,
    pub company_id: CompanyId,
    pub search_id: SearchId,
    pub email: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Insert unless the company already has this email. Returns the new
    /// row, or `None` for a duplicate.
    pub async fn insert_if_absent<'e, E>(
        company_id: CompanyId,
        search_id: SearchId,
        contact: &ExtractedContact,
        executor: E,
    ) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO contacts (id, company_id, search_id, email, name, title)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (company_id, email) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(ContactId::new())
        .bind(company_id)
        .bind(search_id)
        .bind(contact.email.trim().to_lowercase())
        .bind(&contact.name)
        .bind(&contact.title)
        .fetch_optional(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_company<'e, E>(company_id: CompanyId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM contacts WHERE company_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(company_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub fn extracted(&self) -> ExtractedContact {
        ExtractedContact {
            email: self.email.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
        }
    }

    pub fn as_lead(&self, company: LeadCompany) -> LeadContact {
        LeadContact {
            contact_id: Some(self.id),
            email: self.email.clone(),
            company,
        }
    }
}
