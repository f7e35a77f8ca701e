use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use ledgerflow_core::{
    AccountId, Currency, ExpectedVersion, PrincipalId, TransactionId, Versioned,
};
use ledgerflow_ledger::{Account, Hold, LedgerError, LedgerStore, LegKey};

use super::{Blocking, describe, is_unique_violation};

/// Postgres-backed [`LedgerStore`].
///
/// `save` runs in one SQL transaction: a version-guarded `UPDATE` of the
/// account row plus an insert into `applied_legs`, whose primary key
/// `(transaction_id, leg)` turns a replayed leg into a unique violation.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    blocking: Blocking,
}

#[derive(Debug)]
struct AccountRow {
    id: Uuid,
    owner_id: Uuid,
    balance: Decimal,
    currency: String,
    version: i64,
    holds: Json<BTreeMap<TransactionId, Hold>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AccountRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            balance: row.try_get("balance")?,
            currency: row.try_get("currency")?,
            version: row.try_get("version")?,
            holds: row.try_get("holds")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(row.currency.trim())
            .map_err(|e| LedgerError::Storage(format!("bad currency in account row: {e}")))?;
        Ok(Account::restore(
            AccountId::from_uuid(row.id),
            PrincipalId::from_uuid(row.owner_id),
            row.balance,
            currency,
            row.version.max(0) as u64,
            row.holds.0,
        ))
    }
}

const SELECT_ACCOUNT: &str =
    "SELECT id, owner_id, balance, currency, version, holds FROM accounts";

fn storage(operation: &str) -> impl FnOnce(sqlx::Error) -> LedgerError + '_ {
    move |e| LedgerError::Storage(describe(operation, e))
}

impl PostgresLedgerStore {
    /// `handle` must belong to the runtime that owns `pool`.
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool,
            blocking: Blocking::new(handle),
        }
    }

    #[instrument(skip(self, account), fields(account_id = %account.id()), err)]
    pub async fn insert_account(&self, account: Account) -> Result<Account, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, owner_id, balance, currency, version, holds)
            VALUES ($1, $2, $3, $4, 0, $5)
            "#,
        )
        .bind(account.id().as_uuid())
        .bind(*account.owner_id().as_uuid())
        .bind(account.balance())
        .bind(account.currency().as_str())
        .bind(Json(account.holds()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self
                .load_account(*account.id())
                .await?
                .ok_or(LedgerError::NotFound(*account.id())),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::AlreadyExists(*account.id())),
            Err(e) => Err(storage("insert_account")(e)),
        }
    }

    pub async fn load_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!("{SELECT_ACCOUNT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load_account"))?;

        row.map(Account::try_from).transpose()
    }

    pub async fn accounts_of(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError> {
        let rows: Vec<AccountRow> =
            sqlx::query_as(&format!("{SELECT_ACCOUNT} WHERE owner_id = $1 ORDER BY id"))
                .bind(owner.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(storage("accounts_of"))?;

        rows.into_iter().map(Account::try_from).collect()
    }

    #[instrument(
        skip(self, account),
        fields(account_id = %account.id(), expected = ?expected, leg = ?applied),
        err
    )]
    pub async fn save_account(
        &self,
        account: &Account,
        expected: ExpectedVersion,
        applied: Option<LegKey>,
    ) -> Result<Account, LedgerError> {
        let id = *account.id();
        let expected_version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v as i64),
        };

        let mut tx = self.pool.begin().await.map_err(storage("begin"))?;

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET balance = $2, holds = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND ($4::BIGINT IS NULL OR version = $4)
            RETURNING version
            "#,
        )
        .bind(id.as_uuid())
        .bind(account.balance())
        .bind(Json(account.holds()))
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("update_account"))?;

        let Some((new_version,)) = updated else {
            tx.rollback().await.map_err(storage("rollback"))?;
            let exists = self.load_account(id).await?;
            return Err(match exists {
                None => LedgerError::NotFound(id),
                Some(current) => LedgerError::Conflict(format!(
                    "account {id}: expected {expected:?}, found {}",
                    current.version()
                )),
            });
        };

        if let Some(leg) = applied {
            let inserted = sqlx::query(
                r#"
                INSERT INTO applied_legs (transaction_id, leg, account_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(leg.transaction_id.as_uuid())
            .bind(leg.leg.as_str())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback().await.map_err(storage("rollback"))?;
                    return Err(LedgerError::LegAlreadyApplied(leg));
                }
                Err(e) => return Err(storage("insert_applied_leg")(e)),
            }
        }

        tx.commit().await.map_err(storage("commit"))?;

        Ok(Account::restore(
            id,
            account.owner_id(),
            account.balance(),
            account.currency().clone(),
            new_version.max(0) as u64,
            account.holds().clone(),
        ))
    }

    pub async fn leg_applied(&self, leg: LegKey) -> Result<bool, LedgerError> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM applied_legs WHERE transaction_id = $1 AND leg = $2",
        )
        .bind(leg.transaction_id.as_uuid())
        .bind(leg.leg.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("leg_applied"))?;

        Ok(row.is_some())
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn insert(&self, account: Account) -> Result<Account, LedgerError> {
        self.blocking.run(self.insert_account(account))
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.blocking.run(self.load_account(id))
    }

    fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Account>, LedgerError> {
        self.blocking.run(self.accounts_of(owner))
    }

    fn save(
        &self,
        account: &Account,
        expected: ExpectedVersion,
        applied: Option<LegKey>,
    ) -> Result<Account, LedgerError> {
        self.blocking.run(self.save_account(account, expected, applied))
    }

    fn is_applied(&self, leg: LegKey) -> Result<bool, LedgerError> {
        self.blocking.run(self.leg_applied(leg))
    }
}
