use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerflow_core::{AccountId, Amount, Movement, TransactionId, TransactionKind};

use crate::Partitioned;

/// The `type` field of a transaction event.
///
/// Unrecognised values are kept verbatim instead of failing deserialization, so
/// an older consumer can log and skip a type it does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventType {
    Known(TransactionKind),
    Unknown(String),
}

/// Wire message emitted for every committed transaction.
///
/// ```json
/// {"transactionId": "...", "accountId": "...", "destinationAccountId": "...",
///  "amount": "40.00", "type": "TRANSFER", "timestamp": "2024-05-01T10:00:00Z"}
/// ```
///
/// Forward compatible: unknown fields are ignored and `destinationAccountId` may
/// be absent. The schema has grown before (a username field, then a user id,
/// then `destinationAccountId`) and consumers must keep tolerating that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub transaction_id: TransactionId,
    /// Source account (the only account for deposits and withdrawals).
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_account_id: Option<AccountId>,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub timestamp: DateTime<Utc>,
}

/// Why an event could not be turned back into a [`Movement`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("unknown transaction type '{0}'")]
    UnknownType(String),

    #[error("malformed {kind} event: {reason}")]
    Malformed {
        kind: TransactionKind,
        reason: String,
    },
}

impl TransactionEvent {
    pub fn new(
        transaction_id: TransactionId,
        movement: &Movement,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            account_id: movement.source(),
            destination_account_id: movement.destination(),
            amount: movement.amount().value(),
            kind: EventType::Known(movement.kind()),
            timestamp,
        }
    }

    /// Rebuild the validated movement carried by this event.
    pub fn decode(&self) -> Result<Movement, EventDecodeError> {
        let kind = match &self.kind {
            EventType::Known(kind) => *kind,
            EventType::Unknown(raw) => return Err(EventDecodeError::UnknownType(raw.clone())),
        };

        let malformed = |reason: String| EventDecodeError::Malformed { kind, reason };
        let amount = Amount::new(self.amount).map_err(|e| malformed(e.to_string()))?;

        match kind {
            TransactionKind::Deposit | TransactionKind::Withdraw => {
                if self.destination_account_id.is_some() {
                    return Err(malformed(
                        "destinationAccountId is only valid for transfers".to_string(),
                    ));
                }
                Ok(match kind {
                    TransactionKind::Deposit => Movement::deposit(self.account_id, amount),
                    _ => Movement::withdraw(self.account_id, amount),
                })
            }
            TransactionKind::Transfer => {
                let destination = self
                    .destination_account_id
                    .ok_or_else(|| malformed("missing destinationAccountId".to_string()))?;
                Movement::transfer(self.account_id, destination, amount)
                    .map_err(|e| malformed(e.to_string()))
            }
        }
    }
}

impl Partitioned for TransactionEvent {
    fn partition_key(&self) -> AccountId {
        self.account_id
    }
}
