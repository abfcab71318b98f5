// Lead generation pipeline - core
//
// A persistent job queue drives each search through discovery, crawl and
// enrichment, and a deduplicating credit ledger charges once per unique lead.
//
// Business logic is organized per-domain in domains/*/activities/

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
