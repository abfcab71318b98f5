use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::common::{MemberId, SearchId};
use crate::domains::credits::errors::CreditError;
use crate::domains::credits::models::{LeadCharge, Wallet, WalletTransaction, REASON_LEAD_REFUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    Refunded { new_balance: i32 },
    /// No charge exists for this owner, search and key
    NoCharge,
    /// The charge was refunded before
    AlreadyRefunded,
}

/// Return the credit for one charged lead. Missing charges and repeat
/// refunds are benign races and come back as no-op outcomes, not errors.
pub async fn refund_lead_credit(
    owner_id: MemberId,
    search_id: SearchId,
    lead_key: &str,
    pool: &PgPool,
) -> Result<RefundOutcome, CreditError> {
    let mut tx = pool.begin().await?;

    // Serializes with deliveries and other refunds for this owner
    let wallet = Wallet::lock_by_owner(owner_id, &mut *tx).await?;

    let Some(charge) = LeadCharge::find_charge(owner_id, search_id, lead_key, &mut *tx).await? else {
        info!(
            owner_id = %owner_id,
            search_id = %search_id,
            lead_key,
            "refund skipped: no charge for lead"
        );
        return Ok(RefundOutcome::NoCharge);
    };

    if LeadCharge::find_refund_of(charge.id, &mut *tx).await?.is_some() {
        info!(
            owner_id = %owner_id,
            search_id = %search_id,
            lead_key,
            charge_id = %charge.id,
            "refund skipped: lead already refunded"
        );
        return Ok(RefundOutcome::AlreadyRefunded);
    }

    let wallet = wallet.ok_or_else(|| {
        anyhow::anyhow!("wallet missing for owner {} with an outstanding charge", owner_id)
    })?;

    let refund = LeadCharge::insert_refund(&charge, REASON_LEAD_REFUND, &mut *tx).await?;
    let new_balance = Wallet::adjust_balance(wallet.id, 1, &mut *tx).await?;
    WalletTransaction::record(
        wallet.id,
        1,
        REASON_LEAD_REFUND,
        json!({
            "search_id": search_id,
            "lead_key": lead_key,
            "charge_id": charge.id,
            "refund_id": refund.id,
        }),
        &mut *tx,
    )
    .await?;
    tx.commit().await?;

    info!(
        owner_id = %owner_id,
        search_id = %search_id,
        lead_key,
        new_balance,
        "lead credit refunded"
    );

    Ok(RefundOutcome::Refunded { new_balance })
}
