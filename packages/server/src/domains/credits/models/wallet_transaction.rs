use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::common::{WalletId, WalletTransactionId};

pub const REASON_GRANT: &str = "grant";
pub const REASON_LEAD_DELIVERY: &str = "lead_delivery";
pub const REASON_LEAD_REFUND: &str = "lead_refund";

/// Append-only wallet log entry
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub delta: i32,
    pub reason: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub async fn record<'e, E>(
        wallet_id: WalletId,
        delta: i32,
        reason: &str,
        metadata: serde_json::Value,
        executor: E,
    ) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO wallet_transactions (id, wallet_id, delta, reason, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(WalletTransactionId::new())
        .bind(wallet_id)
        .bind(delta)
        .bind(reason)
        .bind(metadata)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Full log for a wallet, oldest first
    pub async fn find_by_wallet<'e, E>(wallet_id: WalletId, executor: E) -> Result<Vec<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(wallet_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn sum_for_wallet<'e, E>(wallet_id: WalletId, executor: E) -> Result<i64>
    where
        E: PgExecutor<'e>,
    {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM wallet_transactions WHERE wallet_id = $1",
        )
        .bind(wallet_id)
        .fetch_one(executor)
        .await?;

        Ok(sum)
    }
}
