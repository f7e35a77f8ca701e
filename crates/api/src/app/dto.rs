use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerflow_core::{AccountId, PrincipalId, TransactionId, TransactionKind, Versioned};
use ledgerflow_ledger::Account;
use ledgerflow_transactions::{TransactionRecord, TransactionStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub owner_id: PrincipalId,
    #[serde(default)]
    pub initial_balance: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipQuery {
    pub user_id: PrincipalId,
}

/// Read-only funds check.
#[derive(Debug, Deserialize)]
pub struct FundsQuery {
    pub sum: Decimal,
}

/// Funds check that reserves `sum` for `transactionId` when it passes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceHoldRequest {
    pub sum: Decimal,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Deserialize)]
pub struct CompatibilityQuery {
    pub from: AccountId,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: AccountId,
    pub owner_id: PrincipalId,
    pub balance: Decimal,
    pub available: Decimal,
    pub currency: String,
    pub version: u64,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: *account.id(),
            owner_id: account.owner_id(),
            balance: account.balance(),
            available: account.available(Utc::now()),
            currency: account.currency().as_str().to_string(),
            version: account.version(),
        }
    }
}

/// Flat wire shape of a transaction record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_account_id: Option<AccountId>,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionRecord> for TransactionResponse {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id,
            account_id: record.movement.source(),
            destination_account_id: record.movement.destination(),
            amount: record.movement.amount().value(),
            kind: record.movement.kind(),
            status: record.status,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}
