use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use crate::common::{MemberId, WalletId};

/// Wallet model - per-owner credit balance
///
/// `balance` always equals the sum of the wallet's transaction deltas; every
/// balance change is written in the same transaction as its log row.
#[derive(FromRow, Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: MemberId,
    pub balance: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Get the owner's wallet, creating an empty one if needed.
    pub async fn open<'e, E>(owner_id: MemberId, executor: E) -> Result<Self>
    where
        E: PgExecutor<'e>,
    {
        // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO wallets (id, owner_id, balance)
            VALUES ($1, $2, 0)
            ON CONFLICT (owner_id) DO UPDATE SET owner_id = EXCLUDED.owner_id
            RETURNING *
            "#,
        )
        .bind(WalletId::new())
        .bind(owner_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_owner<'e, E>(owner_id: MemberId, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM wallets WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Load and row-lock the owner's wallet for the rest of the transaction.
    pub async fn lock_by_owner<'e, E>(owner_id: MemberId, executor: E) -> Result<Option<Self>>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>("SELECT * FROM wallets WHERE owner_id = $1 FOR UPDATE")
            .bind(owner_id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Apply `delta` and return the new balance. The `balance >= 0` check
    /// constraint rejects an overdraw.
    pub async fn adjust_balance<'e, E>(id: WalletId, delta: i32, executor: E) -> Result<i32>
    where
        E: PgExecutor<'e>,
    {
        let balance: i32 = sqlx::query_scalar(
            r#"
            UPDATE wallets
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_one(executor)
        .await?;

        Ok(balance)
    }
}
