use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerflow_core::{AccountId, Movement, TransactionId};
use ledgerflow_events::TransactionEvent;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Committed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Committed => "COMMITTED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

/// The transaction service's durable record of a movement.
///
/// Only created after validation succeeded and immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub movement: Movement,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn committed(id: TransactionId, movement: Movement, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            movement,
            status: TransactionStatus::Committed,
            created_at,
        }
    }

    /// Whether `account` is the source or the destination.
    pub fn involves(&self, account: AccountId) -> bool {
        self.movement.source() == account || self.movement.destination() == Some(account)
    }

    /// The event announcing this record. Carries exactly what the mutator needs.
    pub fn to_event(&self) -> TransactionEvent {
        TransactionEvent::new(self.id, &self.movement, self.created_at)
    }
}
