//! Synchronous validation capability exposed by the account service.
//!
//! The transaction service never reads balances directly. It asks narrow
//! questions (ownership, funds, existence, compatibility) through this trait, which is backed
//! in-process by the ledger or remotely over HTTP.
//!
//! A `false` answer is a confirmed business outcome. Anything else (timeout,
//! connection failure, unexpected status, unparsable body) is a
//! `ValidationUnavailable` and callers must treat it as a denial without
//! reporting it as one.

use std::sync::Arc;

use thiserror::Error;

use crate::id::{AccountId, PrincipalId, TransactionId};
use crate::money::Amount;

/// The validator could not produce an answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationUnavailable {
    #[error("validator timed out: {0}")]
    Timeout(String),

    #[error("validator transport error: {0}")]
    Transport(String),

    #[error("validator returned unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("validator returned a malformed response: {0}")]
    Malformed(String),
}

/// Ownership / funds / existence checks, each bounded by a timeout.
pub trait Validator: Send + Sync {
    /// Does `principal` own `account`? Unknown accounts answer `false`.
    fn check_ownership(
        &self,
        account: AccountId,
        principal: PrincipalId,
    ) -> Result<bool, ValidationUnavailable>;

    /// Does `account` have at least `amount` available?
    ///
    /// On `true` the amount is held against the account under `hold` until the
    /// matching debit is applied, the hold is released, or it expires.
    fn check_funds(
        &self,
        account: AccountId,
        amount: Amount,
        hold: TransactionId,
    ) -> Result<bool, ValidationUnavailable>;

    /// Does `account` exist?
    fn check_exists(&self, account: AccountId) -> Result<bool, ValidationUnavailable>;

    /// Can `destination` receive money from `source`? Both must exist and hold
    /// the same currency.
    fn check_compatible(
        &self,
        source: AccountId,
        destination: AccountId,
    ) -> Result<bool, ValidationUnavailable>;

    /// Drop a hold placed by `check_funds`. Releasing an unknown hold is a no-op.
    fn release_hold(
        &self,
        account: AccountId,
        hold: TransactionId,
    ) -> Result<(), ValidationUnavailable>;
}

impl<V> Validator for Arc<V>
where
    V: Validator + ?Sized,
{
    fn check_ownership(
        &self,
        account: AccountId,
        principal: PrincipalId,
    ) -> Result<bool, ValidationUnavailable> {
        (**self).check_ownership(account, principal)
    }

    fn check_funds(
        &self,
        account: AccountId,
        amount: Amount,
        hold: TransactionId,
    ) -> Result<bool, ValidationUnavailable> {
        (**self).check_funds(account, amount, hold)
    }

    fn check_exists(&self, account: AccountId) -> Result<bool, ValidationUnavailable> {
        (**self).check_exists(account)
    }

    fn check_compatible(
        &self,
        source: AccountId,
        destination: AccountId,
    ) -> Result<bool, ValidationUnavailable> {
        (**self).check_compatible(source, destination)
    }

    fn release_hold(
        &self,
        account: AccountId,
        hold: TransactionId,
    ) -> Result<(), ValidationUnavailable> {
        (**self).release_hold(account, hold)
    }
}
