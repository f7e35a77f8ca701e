use rust_decimal::Decimal;
use thiserror::Error;

use ledgerflow_core::{AccountId, Currency, DomainError};

use crate::leg::LegKey;

/// Ledger operation error.
///
/// - **NotFound / AlreadyExists**: account identity problems
/// - **InsufficientFunds**: a debit would drive the balance below zero
/// - **BalanceLimit**: a credit would push the balance past what storage can hold
/// - **Conflict**: optimistic concurrency clash (retried by [`Ledger`] before surfacing)
/// - **LegAlreadyApplied**: the idempotency log already holds this leg
/// - **Storage**: backend failure (connection, poisoned lock, bad row)
///
/// [`Ledger`]: crate::Ledger
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error("account {0} already exists")]
    AlreadyExists(AccountId),

    #[error("insufficient funds on account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("credit of {credited} would exceed the balance limit of account {account} (balance {balance})")]
    BalanceLimit {
        account: AccountId,
        balance: Decimal,
        credited: Decimal,
    },

    #[error("currency mismatch: {source_currency} -> {destination_currency}")]
    CurrencyMismatch {
        source_currency: Currency,
        destination_currency: Currency,
    },

    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("leg {0} already applied")]
    LegAlreadyApplied(LegKey),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("ledger storage error: {0}")]
    Storage(String),
}
