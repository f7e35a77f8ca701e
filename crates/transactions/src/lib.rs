//! `ledgerflow-transactions` — the transaction service.
//!
//! Validates requests against the account service, records them and announces
//! them on the event channel. It never touches balances.

pub mod error;
pub mod orchestrator;
pub mod record;
pub mod request;
pub mod store;

pub use error::TransactionError;
pub use orchestrator::Orchestrator;
pub use record::{TransactionRecord, TransactionStatus};
pub use request::{CheckedRequest, CreateTransaction};
pub use store::{InMemoryTransactionStore, TransactionStore, TransactionStoreError};
