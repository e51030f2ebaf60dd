//! Credit error types.

use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum CreditError {
    /// Neither the targeted account nor the wallet could cover the debit.
    /// All balances are left unchanged.
    #[error("Insufficient credits")]
    InsufficientCredits,

    /// The named account does not belong to the caller (or does not exist).
    #[error("Account {account_id} is not accessible by this owner")]
    Unauthorized { account_id: String },

    /// A grant targeted an account that no longer exists.
    #[error("Unknown account: {account_id}")]
    UnknownAccount { account_id: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CreditError {
    /// Whether this error is a business-rule rejection surfaced to the end
    /// user (as opposed to an internal failure).
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCredits | Self::Unauthorized { .. }
        )
    }
}
