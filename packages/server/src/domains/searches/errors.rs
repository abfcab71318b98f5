use crate::common::SearchId;

/// Errors surfaced by the search entry points
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search query must not be empty")]
    InvalidQuery,

    #[error("max_results must be positive, got {0}")]
    InvalidMaxResults(i32),

    #[error("Search not found: {0}")]
    NotFound(SearchId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
