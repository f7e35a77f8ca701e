//! Account service operations on top of a [`LedgerStore`].

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use ledgerflow_core::{
    AccountId, Amount, Currency, ExpectedVersion, PrincipalId, TransactionId, Versioned,
};

use crate::account::{Account, HoldOutcome};
use crate::error::LedgerError;
use crate::leg::{Leg, LegKey, LegPlan};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Read-modify-write attempts before a `Conflict` is surfaced.
    pub max_attempts: u32,
    /// Lifetime of a funds hold.
    pub hold_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            hold_ttl: Duration::minutes(5),
        }
    }
}

/// Outcome of applying one leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegOutcome {
    Applied(Account),
    /// The leg log already held this key; nothing changed.
    AlreadyApplied,
}

/// The account service: the only writer of balances.
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> Ledger<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn open_account(
        &self,
        owner: PrincipalId,
        initial_balance: Decimal,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        let account = Account::open(AccountId::new(), owner, initial_balance, currency)?;
        let stored = self.store.insert(account)?;
        info!(
            account_id = %stored.id(),
            owner_id = %owner,
            currency = %stored.currency(),
            "account opened"
        );
        Ok(stored)
    }

    pub fn find_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.store.load(id)
    }

    pub fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.find_account(id)?.ok_or(LedgerError::NotFound(id))
    }

    pub fn accounts_for_owner(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError> {
        self.store.find_by_owner(owner)
    }

    /// Hold `amount` on `account` for transaction `tx` if available funds cover it.
    ///
    /// Returns `false` when funds are insufficient. Repeating the call for a
    /// transaction that already holds funds returns `true` without reserving twice.
    pub fn reserve(
        &self,
        account: AccountId,
        amount: Amount,
        tx: TransactionId,
    ) -> Result<bool, LedgerError> {
        let ttl = self.config.hold_ttl;
        let mut outcome = HoldOutcome::Insufficient;

        self.update(account, None, |acc| {
            outcome = acc.place_hold(tx, amount, Utc::now(), ttl);
            Ok(outcome == HoldOutcome::Placed)
        })?;

        debug!(account_id = %account, transaction_id = %tx, ?outcome, "funds check");
        Ok(outcome != HoldOutcome::Insufficient)
    }

    /// Drop the hold of `tx` on `account`. Unknown holds are ignored.
    pub fn release(&self, account: AccountId, tx: TransactionId) -> Result<(), LedgerError> {
        self.update(account, None, |acc| Ok(acc.release_hold(tx)))?;
        debug!(account_id = %account, transaction_id = %tx, "hold released");
        Ok(())
    }

    pub fn is_applied(&self, key: LegKey) -> Result<bool, LedgerError> {
        self.store.is_applied(key)
    }

    /// Apply one leg exactly once.
    ///
    /// The balance change and the leg record are written together; a leg seen
    /// before (including one that races in between) yields `AlreadyApplied`.
    pub fn apply_leg(&self, plan: &LegPlan) -> Result<LegOutcome, LedgerError> {
        if self.store.is_applied(plan.key)? {
            return Ok(LegOutcome::AlreadyApplied);
        }

        let result = self.update(plan.account, Some(plan.key), |acc| {
            match plan.key.leg {
                Leg::Credit => acc.credit(plan.amount)?,
                Leg::Debit => acc.debit(plan.key.transaction_id, plan.amount)?,
            }
            Ok(true)
        });

        match result {
            Ok(account) => {
                info!(
                    transaction_id = %plan.key.transaction_id,
                    account_id = %plan.account,
                    leg = plan.key.leg.as_str(),
                    amount = %plan.amount,
                    balance = %account.balance(),
                    "leg applied"
                );
                Ok(LegOutcome::Applied(account))
            }
            Err(LedgerError::LegAlreadyApplied(_)) => Ok(LegOutcome::AlreadyApplied),
            Err(err) => Err(err),
        }
    }

    /// Optimistic read-modify-write with bounded retries.
    ///
    /// `mutate` returns whether it changed the account; unchanged accounts are
    /// not written.
    fn update(
        &self,
        id: AccountId,
        leg: Option<LegKey>,
        mut mutate: impl FnMut(&mut Account) -> Result<bool, LedgerError>,
    ) -> Result<Account, LedgerError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_conflict = String::new();

        for attempt in 1..=attempts {
            let mut account = self.account(id)?;
            let expected = ExpectedVersion::Exact(account.version());

            if !mutate(&mut account)? {
                return Ok(account);
            }

            match self.store.save(&account, expected, leg) {
                Err(LedgerError::Conflict(reason)) => {
                    debug!(account_id = %id, attempt, %reason, "version conflict, retrying");
                    last_conflict = reason;
                }
                other => return other,
            }
        }

        warn!(account_id = %id, attempts, "giving up after repeated version conflicts");
        Err(LedgerError::Conflict(format!(
            "account {id}: {attempts} attempts exhausted ({last_conflict})"
        )))
    }
}
