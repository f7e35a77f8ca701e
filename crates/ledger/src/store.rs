use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use ledgerflow_core::{AccountId, ExpectedVersion, PrincipalId, Versioned};

use crate::account::Account;
use crate::error::LedgerError;
use crate::leg::LegKey;

/// Versioned account storage with an applied-leg log.
///
/// ## Atomicity
///
/// `save` is the only mutating path for existing accounts. In one atomic step it:
/// - checks `expected` against the stored version (`Conflict` on mismatch)
/// - checks `applied` against the leg log (`LegAlreadyApplied` if present)
/// - writes the account with `version + 1` and records the leg
///
/// Either everything is written or nothing is.
pub trait LedgerStore: Send + Sync {
    /// Store a brand new account (version 0). Fails with `AlreadyExists`.
    fn insert(&self, account: Account) -> Result<Account, LedgerError>;

    fn load(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError>;

    /// Conditionally write `account`. Returns the stored state (new version).
    fn save(
        &self,
        account: &Account,
        expected: ExpectedVersion,
        applied: Option<LegKey>,
    ) -> Result<Account, LedgerError>;

    fn is_applied(&self, leg: LegKey) -> Result<bool, LedgerError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert(&self, account: Account) -> Result<Account, LedgerError> {
        (**self).insert(account)
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        (**self).load(id)
    }

    fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError> {
        (**self).find_by_owner(owner)
    }

    fn save(
        &self,
        account: &Account,
        expected: ExpectedVersion,
        applied: Option<LegKey>,
    ) -> Result<Account, LedgerError> {
        (**self).save(account, expected, applied)
    }

    fn is_applied(&self, leg: LegKey) -> Result<bool, LedgerError> {
        (**self).is_applied(leg)
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    applied: HashSet<LegKey>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A single lock covers accounts and the leg log so
/// `save` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LedgerError {
    LedgerError::Storage("lock poisoned".to_string())
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert(&self, account: Account) -> Result<Account, LedgerError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = *account.id();
        if state.accounts.contains_key(&id) {
            return Err(LedgerError::AlreadyExists(id));
        }

        let mut stored = account;
        stored.version = 0;
        state.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.accounts.get(&id).cloned())
    }

    fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner_id() == owner)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| *a.id());
        Ok(accounts)
    }

    fn save(
        &self,
        account: &Account,
        expected: ExpectedVersion,
        applied: Option<LegKey>,
    ) -> Result<Account, LedgerError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let id = *account.id();

        let current = state
            .accounts
            .get(&id)
            .map(|a| a.version())
            .ok_or(LedgerError::NotFound(id))?;

        if !expected.matches(current) {
            return Err(LedgerError::Conflict(format!(
                "account {id}: expected {expected:?}, found {current}"
            )));
        }

        if let Some(leg) = applied {
            if state.applied.contains(&leg) {
                return Err(LedgerError::LegAlreadyApplied(leg));
            }
            state.applied.insert(leg);
        }

        let mut stored = account.clone();
        stored.version = current + 1;
        state.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    fn is_applied(&self, leg: LegKey) -> Result<bool, LedgerError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.applied.contains(&leg))
    }
}
