use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::common::{LeadChargeId, MemberId, SearchId};

/// Delivered-lead charge record
///
/// `delta = -1` is a charge (at most one per owner and lead key, ever);
/// `delta = +1` is a refund pointing at its charge through `charge_id`
/// (at most one per charge).
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct LeadCharge {
    pub id: LeadChargeId,
    pub owner_id: MemberId,
    pub search_id: SearchId,
    pub lead_key: String,
    pub delta: i32,
    pub reason: String,
    pub charge_id: Option<LeadChargeId>,
    pub created_at: DateTime<Utc>,
}

impl LeadCharge {
    pub fn is_refund(&self) -> bool {
        self.delta > 0
    }

    /// Which of `lead_keys` the owner has already been charged for.
    pub async fn charged_keys<'e, E>(
        owner_id: MemberId,
        lead_keys: &[String],
        executor: E,
    ) -> Result<HashSet<String>>
    where
        E: PgExecutor<'e>,
    {
        if lead_keys.is_empty() {
            return Ok(HashSet::new());
        }

        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT lead_key
            FROM lead_charges
            WHERE owner_id = $1 AND delta = -1 AND lead_key = ANY($2)
            "#,
        )
        .bind(owner_id)
        .bind(lead_keys)
        .fetch_all(executor)
        .await?;

        Ok(keys.into_iter().collect())
    }

    pub async fn insert_charge<'e, E>(
        owner_id: MemberId,
        search_id: SearchId,
        lead_key: &str,
        reason: &str,
        executor: E,
    ) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO lead_charges (id, owner_id, search_id, lead_key, delta, reason)
            VALUES ($1, $2, $3, $4, -1, $5)
            RETURNING *
            "#,
        )
        .bind(LeadChargeId::new())
        .bind(owner_id)
        .bind(search_id)
        .bind(lead_key)
        .bind(reason)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// The charge for this lead key made by this search, if any.
    pub async fn find_charge<'e, E>(
        owner_id: MemberId,
        search_id: SearchId,
        lead_key: &str,
        executor: E,
    ) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM lead_charges
            WHERE owner_id = $1 AND search_id = $2 AND lead_key = $3 AND delta = -1
            "#,
        )
        .bind(owner_id)
        .bind(search_id)
        .bind(lead_key)
        .fetch_optional(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find_refund_of<'e, E>(charge_id: LeadChargeId, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM lead_charges WHERE charge_id = $1 AND delta = 1")
            .bind(charge_id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert_refund<'e, E>(charge: &LeadCharge, reason: &str, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO lead_charges (id, owner_id, search_id, lead_key, delta, reason, charge_id)
            VALUES ($1, $2, $3, $4, 1, $5, $6)
            RETURNING *
            "#,
        )
        .bind(LeadChargeId::new())
        .bind(charge.owner_id)
        .bind(charge.search_id)
        .bind(&charge.lead_key)
        .bind(reason)
        .bind(charge.id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Charges and refunds recorded against a search, oldest first
    pub async fn find_by_search<'e, E>(search_id: SearchId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM lead_charges WHERE search_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(search_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }
}
