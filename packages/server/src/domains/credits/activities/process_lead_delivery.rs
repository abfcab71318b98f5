//! Charge for delivered leads, once per unique lead key per owner.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::common::{ContactId, MemberId, SearchId};
use crate::domains::credits::errors::CreditError;
use crate::domains::credits::lead_key::{generate_lead_key, LeadContact};
use crate::domains::credits::models::{LeadCharge, Wallet, WalletTransaction, REASON_LEAD_DELIVERY};
use crate::domains::searches::models::{LeadRollup, Search};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveredLead {
    pub lead_key: String,
    pub contact_id: Option<ContactId>,
    pub email: String,
    /// False when the lead was already charged (earlier call or earlier in this batch)
    pub net_new: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeadDeliveryResult {
    pub total_found: i32,
    pub total_deduped: i32,
    pub total_net_new: i32,
    pub credits_charged: i32,
    pub delivered_leads: Vec<DeliveredLead>,
}

impl LeadDeliveryResult {
    fn rollup(&self) -> LeadRollup {
        LeadRollup {
            found: self.total_found,
            deduped: self.total_deduped,
            net_new: self.total_net_new,
            credits_charged: self.credits_charged,
        }
    }
}

/// Classify each contact as deduped or net-new and charge one credit per
/// net-new lead.
///
/// Runs in one transaction holding the owner's wallet row lock from before
/// the dedup lookup until commit, so concurrent deliveries for one owner
/// cannot both treat a lead as net-new or both spend the same balance.
/// On [`CreditError::InsufficientCredits`] nothing is written.
pub async fn process_lead_delivery(
    owner_id: MemberId,
    search_id: SearchId,
    contacts: &[LeadContact],
    pool: &PgPool,
) -> Result<LeadDeliveryResult, CreditError> {
    let mut tx = pool.begin().await?;
    let result = deliver_leads(owner_id, search_id, contacts, &mut *tx).await?;
    tx.commit().await?;
    Ok(result)
}

/// [`process_lead_delivery`] inside the caller's transaction, for callers
/// that commit other writes together with the delivery.
///
/// The wallet row lock is held until the caller commits. On
/// [`CreditError::InsufficientCredits`] nothing has been written and the
/// transaction is still usable.
pub async fn deliver_leads(
    owner_id: MemberId,
    search_id: SearchId,
    contacts: &[LeadContact],
    conn: &mut PgConnection,
) -> Result<LeadDeliveryResult, CreditError> {
    let wallet = Wallet::lock_by_owner(owner_id, &mut *conn).await?;

    let keys: Vec<String> = contacts.iter().map(generate_lead_key).collect();
    let unique_keys: Vec<String> = keys
        .iter()
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let mut already_charged = LeadCharge::charged_keys(owner_id, &unique_keys, &mut *conn).await?;

    let mut result = LeadDeliveryResult::default();
    let mut net_new_keys = Vec::new();
    for (contact, key) in contacts.iter().zip(keys) {
        // insert() is false for a key charged before or seen earlier in this batch
        let net_new = already_charged.insert(key.clone());
        if net_new {
            net_new_keys.push(key.clone());
            result.total_net_new += 1;
        } else {
            result.total_deduped += 1;
        }
        result.delivered_leads.push(DeliveredLead {
            lead_key: key,
            contact_id: contact.contact_id,
            email: contact.email.clone(),
            net_new,
        });
    }
    result.total_found = contacts.len() as i32;

    if !net_new_keys.is_empty() {
        let required = result.total_net_new;
        let available = wallet.as_ref().map_or(0, |w| w.balance);
        let wallet = match wallet {
            Some(wallet) if available >= required => wallet,
            _ => {
                info!(
                    owner_id = %owner_id,
                    search_id = %search_id,
                    required,
                    available,
                    "lead delivery rejected: insufficient credits"
                );
                return Err(CreditError::InsufficientCredits {
                    required,
                    available,
                });
            }
        };

        for key in &net_new_keys {
            LeadCharge::insert_charge(owner_id, search_id, key, REASON_LEAD_DELIVERY, &mut *conn)
                .await?;
        }
        Wallet::adjust_balance(wallet.id, -required, &mut *conn).await?;
        WalletTransaction::record(
            wallet.id,
            -required,
            REASON_LEAD_DELIVERY,
            json!({
                "search_id": search_id,
                "lead_count": required,
                "lead_keys": net_new_keys,
            }),
            &mut *conn,
        )
        .await?;
        result.credits_charged = required;
    }

    Search::add_lead_rollup(search_id, &result.rollup(), &mut *conn).await?;

    if result.credits_charged > 0 {
        info!(
            owner_id = %owner_id,
            search_id = %search_id,
            found = result.total_found,
            deduped = result.total_deduped,
            charged = result.credits_charged,
            "leads delivered"
        );
    } else {
        debug!(
            owner_id = %owner_id,
            search_id = %search_id,
            found = result.total_found,
            deduped = result.total_deduped,
            "leads delivered without charge"
        );
    }

    Ok(result)
}
