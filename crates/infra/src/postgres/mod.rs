//! Postgres adapters for the ledger and transaction stores.
//!
//! The store traits are synchronous; these adapters run sqlx futures on a
//! captured tokio runtime handle. Safe to call from:
//! - plain threads (worker loops)
//! - `spawn_blocking` closures
//! - multi-threaded runtime workers (via `block_in_place`)
//!
//! Calling from a current-thread runtime worker panics.

mod ledger_store;
mod transaction_store;

use std::future::Future;

use sqlx::PgPool;
use tokio::runtime::Handle;

pub use ledger_store::PostgresLedgerStore;
pub use transaction_store::PostgresTransactionStore;

const SCHEMA: &str = include_str!("../../migrations/0001_ledgerflow.sql");

/// Create tables and indexes if missing. Idempotent.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Runs async sqlx calls behind a sync interface.
#[derive(Debug, Clone)]
pub(crate) struct Blocking {
    handle: Handle,
}

impl Blocking {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub(crate) fn run<F: Future>(&self, fut: F) -> F::Output {
        if Handle::try_current().is_ok() {
            tokio::task::block_in_place(|| self.handle.block_on(fut))
        } else {
            self.handle.block_on(fut)
        }
    }
}

/// Unique violation (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

pub(crate) fn describe(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {operation}: {}", db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}
