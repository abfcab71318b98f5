pub mod search;

pub use search::{LeadRollup, Search, SearchStatus, SearchStatusView};
