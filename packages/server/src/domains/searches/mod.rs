//! Searches domain - the user-facing aggregate for one discovery request
//!
//! A search is created Pending together with its Discovery job, moved to
//! Running by discovery, and finished by the completion tracker.

pub mod activities;
pub mod errors;
pub mod models;

pub use errors::SearchError;
pub use models::{Search, SearchStatus, SearchStatusView};
