//! Credits domain - wallets and the deduplicating lead ledger
//!
//! Charging is per unique lead key per owner, not per contact or per
//! delivery: re-delivering a lead is free, and a refund can only follow a
//! charge, once.

pub mod activities;
pub mod errors;
pub mod lead_key;
pub mod models;

pub use activities::{
    deliver_leads, grant_credits, process_lead_delivery, refund_lead_credit, DeliveredLead,
    LeadDeliveryResult, RefundOutcome,
};
pub use errors::CreditError;
pub use lead_key::{generate_lead_key, LeadCompany, LeadContact};
pub use models::{LeadCharge, Wallet, WalletTransaction};
