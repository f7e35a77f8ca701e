use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use ledgerflow_core::{AccountId, Amount, Movement, TransactionId};
use ledgerflow_transactions::{
    TransactionRecord, TransactionStatus, TransactionStore, TransactionStoreError,
};

use super::{Blocking, describe, is_unique_violation};

/// Postgres-backed [`TransactionStore`]. Insert-only; the table has no update path.
#[derive(Debug, Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
    blocking: Blocking,
}

#[derive(Debug)]
struct TransactionRow {
    id: Uuid,
    kind: String,
    source_account_id: Uuid,
    destination_account_id: Option<Uuid>,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TransactionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            source_account_id: row.try_get("source_account_id")?,
            destination_account_id: row.try_get("destination_account_id")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = TransactionStoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let bad = |what: String| TransactionStoreError::Backend(format!("bad transaction row {}: {what}", row.id));

        let amount = Amount::new(row.amount).map_err(|e| bad(e.to_string()))?;
        let source = AccountId::from_uuid(row.source_account_id);
        let movement = match (row.kind.as_str(), row.destination_account_id) {
            ("DEPOSIT", None) => Movement::deposit(source, amount),
            ("WITHDRAW", None) => Movement::withdraw(source, amount),
            ("TRANSFER", Some(destination)) => {
                Movement::transfer(source, AccountId::from_uuid(destination), amount)
                    .map_err(|e| bad(e.to_string()))?
            }
            (kind, destination) => {
                return Err(bad(format!("kind {kind} with destination {destination:?}")));
            }
        };
        let status = match row.status.as_str() {
            "COMMITTED" => TransactionStatus::Committed,
            "PENDING" => TransactionStatus::Pending,
            "FAILED" => TransactionStatus::Failed,
            other => return Err(bad(format!("status {other}"))),
        };

        Ok(TransactionRecord {
            id: TransactionId::from_uuid(row.id),
            movement,
            status,
            created_at: row.created_at,
        })
    }
}

const SELECT_TRANSACTION: &str = "SELECT id, kind, source_account_id, destination_account_id, amount, status, created_at FROM transactions";

fn backend(operation: &str) -> impl FnOnce(sqlx::Error) -> TransactionStoreError + '_ {
    move |e| TransactionStoreError::Backend(describe(operation, e))
}

impl PostgresTransactionStore {
    /// `handle` must belong to the runtime that owns `pool`.
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool,
            blocking: Blocking::new(handle),
        }
    }

    #[instrument(skip(self, record), fields(transaction_id = %record.id), err)]
    pub async fn insert_record(
        &self,
        record: TransactionRecord,
    ) -> Result<TransactionRecord, TransactionStoreError> {
        if record.status != TransactionStatus::Committed {
            return Err(TransactionStoreError::NotCommitted(record.status.as_str()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, source_account_id, destination_account_id, amount, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.movement.kind().as_str())
        .bind(*record.movement.source().as_uuid())
        .bind(record.movement.destination().map(|d| *d.as_uuid()))
        .bind(record.movement.amount().value())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(e) if is_unique_violation(&e) => Err(TransactionStoreError::Duplicate(record.id)),
            Err(e) => Err(backend("insert_record")(e)),
        }
    }

    pub async fn fetch(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransactionStoreError> {
        let row: Option<TransactionRow> =
            sqlx::query_as(&format!("{SELECT_TRANSACTION} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend("fetch"))?;

        row.map(TransactionRecord::try_from).transpose()
    }

    pub async fn fetch_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransactionStoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "{SELECT_TRANSACTION} WHERE source_account_id = $1 OR destination_account_id = $1 ORDER BY created_at, id"
        ))
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend("fetch_for_account"))?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}

impl TransactionStore for PostgresTransactionStore {
    fn append(&self, record: TransactionRecord) -> Result<TransactionRecord, TransactionStoreError> {
        self.blocking.run(self.insert_record(record))
    }

    fn get(&self, id: TransactionId) -> Result<Option<TransactionRecord>, TransactionStoreError> {
        self.blocking.run(self.fetch(id))
    }

    fn list_by_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransactionStoreError> {
        self.blocking.run(self.fetch_for_account(account))
    }
}
