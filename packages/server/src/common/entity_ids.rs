//! Typed ids for every entity the pipeline persists.

pub use super::id::Id;

/// Entity marker types. Only used as `Id<T>` parameters.
pub mod markers {
    /// The account that owns searches and wallets.
    pub struct Member;
    pub struct Search;
    pub struct Job;
    pub struct Company;
    pub struct Contact;
    pub struct Wallet;
    pub struct WalletTransaction;
    pub struct LeadCharge;
}

pub type MemberId = Id<markers::Member>;
pub type SearchId = Id<markers::Search>;
pub type JobId = Id<markers::Job>;
pub type CompanyId = Id<markers::Company>;
pub type ContactId = Id<markers::Contact>;
pub type WalletId = Id<markers::Wallet>;
pub type WalletTransactionId = Id<markers::WalletTransaction>;
pub type LeadChargeId = Id<markers::LeadCharge>;
