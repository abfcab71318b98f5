pub mod lead_charge;
pub mod wallet;
pub mod wallet_transaction;

pub use lead_charge::LeadCharge;
pub use wallet::Wallet;
pub use wallet_transaction::{
    WalletTransaction, REASON_GRANT, REASON_LEAD_DELIVERY, REASON_LEAD_REFUND,
};
