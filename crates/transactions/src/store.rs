use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use ledgerflow_core::{AccountId, TransactionId};

use crate::record::{TransactionRecord, TransactionStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionStoreError {
    #[error("transaction {0} already exists")]
    Duplicate(TransactionId),

    #[error("only committed transactions can be stored (got {0})")]
    NotCommitted(&'static str),

    #[error("transaction storage error: {0}")]
    Backend(String),
}

/// Append-only transaction history.
///
/// No updates and no deletes. Listing returns every record where the account is
/// source or destination, oldest first.
pub trait TransactionStore: Send + Sync {
    fn append(&self, record: TransactionRecord) -> Result<TransactionRecord, TransactionStoreError>;

    fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>, TransactionStoreError>;

    fn list_by_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransactionStoreError>;
}

impl<S> TransactionStore for Arc<S>
where
    S: TransactionStore + ?Sized,
{
    fn append(&self, record: TransactionRecord) -> Result<TransactionRecord, TransactionStoreError> {
        (**self).append(record)
    }

    fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>, TransactionStoreError> {
        (**self).get(id)
    }

    fn list_by_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransactionStoreError> {
        (**self).list_by_account(account)
    }
}

#[derive(Debug, Default)]
struct State {
    by_id: HashMap<TransactionId, TransactionRecord>,
    order: Vec<TransactionId>,
}

/// In-memory transaction store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    state: RwLock<State>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> TransactionStoreError {
    TransactionStoreError::Backend("lock poisoned".to_string())
}

impl TransactionStore for InMemoryTransactionStore {
    fn append(&self, record: TransactionRecord) -> Result<TransactionRecord, TransactionStoreError> {
        if record.status != TransactionStatus::Committed {
            return Err(TransactionStoreError::NotCommitted(record.status.as_str()));
        }

        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.by_id.contains_key(&record.id) {
            return Err(TransactionStoreError::Duplicate(record.id));
        }

        state.order.push(record.id);
        state.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>, TransactionStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn list_by_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransactionStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut records: Vec<TransactionRecord> = state
            .order
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .filter(|r| r.involves(account))
            .cloned()
            .collect();
        // Stable: ties keep insertion order.
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
