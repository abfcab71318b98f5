//! Pipeline domain - the Discovery → Crawl → Enrichment stages
//!
//! Architecture:
//!   JobWorker → PipelineHandler (match on JobType) → stage activity
//!   → collaborator call → one transaction (rows + follow-on jobs + counter)

pub mod activities;
pub mod handler;
pub mod models;

pub use handler::PipelineHandler;
pub use models::{Company, Contact};
