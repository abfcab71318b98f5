use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::common::MemberId;
use crate::domains::credits::errors::CreditError;
use crate::domains::credits::models::{Wallet, WalletTransaction};

/// Top up an owner's wallet, opening it if needed.
///
/// Returns the wallet with its new balance.
pub async fn grant_credits(
    owner_id: MemberId,
    amount: i32,
    reason: &str,
    pool: &PgPool,
) -> Result<Wallet, CreditError> {
    if amount <= 0 {
        return Err(CreditError::InvalidAmount(amount));
    }

    let mut tx = pool.begin().await?;
    let mut wallet = Wallet::open(owner_id, &mut *tx).await?;
    wallet.balance = Wallet::adjust_balance(wallet.id, amount, &mut *tx).await?;
    WalletTransaction::record(wallet.id, amount, reason, json!({ "kind": "grant" }), &mut *tx)
        .await?;
    tx.commit().await?;

    info!(
        owner_id = %owner_id,
        amount,
        balance = wallet.balance,
        reason,
        "credits granted"
    );

    Ok(wallet)
}
