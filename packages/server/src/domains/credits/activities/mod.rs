//! Credit ledger actions - charge, refund and top-up

mod grant_credits;
mod process_lead_delivery;
mod refund_lead_credit;

pub use grant_credits::grant_credits;
pub use process_lead_delivery::{
    deliver_leads, process_lead_delivery, DeliveredLead, LeadDeliveryResult,
};
pub use refund_lead_credit::{refund_lead_credit, RefundOutcome};
