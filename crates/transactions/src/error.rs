use thiserror::Error;

use ledgerflow_core::{AccountId, DomainError, PrincipalId, TransactionId, ValidationUnavailable};

use crate::store::TransactionStoreError;

/// Transaction service error.
///
/// `ValidationUnavailable` is deny-safe: the request is refused, but the caller
/// is told the answer is unknown rather than negative.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("principal {principal} is not allowed to act on account {account}")]
    Unauthorized {
        account: AccountId,
        principal: PrincipalId,
    },

    #[error("insufficient funds on account {0}")]
    InsufficientFunds(AccountId),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("validation unavailable: {0}")]
    ValidationUnavailable(#[from] ValidationUnavailable),

    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("transaction store error: {0}")]
    Store(String),

    /// The record is durable but its event never reached the channel.
    #[error("transaction {transaction_id} recorded but not published: {reason}")]
    PublishFailure {
        transaction_id: TransactionId,
        reason: String,
    },
}

impl From<DomainError> for TransactionError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Conflict(msg) => TransactionError::Conflict(msg),
            other => TransactionError::Validation(other.to_string()),
        }
    }
}

impl From<TransactionStoreError> for TransactionError {
    fn from(err: TransactionStoreError) -> Self {
        match err {
            TransactionStoreError::Duplicate(_) => TransactionError::Conflict(err.to_string()),
            TransactionStoreError::NotCommitted(_) | TransactionStoreError::Backend(_) => {
                TransactionError::Store(err.to_string())
            }
        }
    }
}
