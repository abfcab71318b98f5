/// Errors surfaced by the credit ledger
#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    /// The whole delivery was rejected; nothing was charged or recorded.
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i32, available: i32 },

    #[error("Credit amount must be positive, got {0}")]
    InvalidAmount(i32),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
