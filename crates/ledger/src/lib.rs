//! `ledgerflow-ledger` — the account service.
//!
//! Owns account balances and is their only writer:
//! - `store`: versioned account storage with the applied-leg log
//! - `ledger`: account operations with bounded optimistic retries
//! - `validator`: in-process ownership/funds/existence checks (funds holds)
//! - `mutator`: idempotent consumer of transaction events

pub mod account;
pub mod error;
pub mod leg;
pub mod ledger;
pub mod mutator;
pub mod store;
pub mod validator;

pub use account::{Account, Hold, HoldOutcome};
pub use error::LedgerError;
pub use leg::{plan_legs, Leg, LegKey, LegPlan};
pub use ledger::{Ledger, LedgerConfig, LegOutcome};
pub use mutator::{BalanceMutator, MutationError, MutationOutcome};
pub use store::{InMemoryLedgerStore, LedgerStore};
pub use validator::LedgerValidator;
