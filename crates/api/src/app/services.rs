//! Service wiring: stores, event channel, validator, orchestrator and the
//! background balance mutator.
//!
//! Everything here is synchronous. Build services outside of async tasks (the
//! HTTP validator owns a blocking client, the Postgres stores block on the
//! given runtime handle).

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::info;

use ledgerflow_core::Validator;
use ledgerflow_events::{EventBus, InMemoryEventBus, Subscription, TransactionEvent};
use ledgerflow_infra::{HttpValidatorClient, InMemoryDeadLetterSink, MutatorWorker, WorkerHandle};
use ledgerflow_ledger::{BalanceMutator, InMemoryLedgerStore, Ledger, LedgerStore, LedgerValidator};
use ledgerflow_transactions::{InMemoryTransactionStore, Orchestrator, TransactionStore};

use crate::config::Config;

pub type SharedLedgerStore = Arc<dyn LedgerStore>;
pub type SharedValidator = Arc<dyn Validator>;
pub type SharedTransactionStore = Arc<dyn TransactionStore>;
pub type SharedBus = Arc<dyn EventBus<TransactionEvent, Error = String>>;

pub type AppOrchestrator = Orchestrator<SharedValidator, SharedTransactionStore, SharedBus>;

/// Consumer group of the balance mutator on the Redis shard streams.
#[cfg(feature = "persistent")]
pub const MUTATOR_GROUP: &str = "ledger.mutator";

/// Erases the channel's error type so in-memory and Redis buses share one
/// orchestrator type.
struct ErasedBus<B>(B);

impl<B> EventBus<TransactionEvent> for ErasedBus<B>
where
    B: EventBus<TransactionEvent>,
{
    type Error = String;

    fn publish(&self, message: TransactionEvent) -> Result<(), Self::Error> {
        self.0.publish(message).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> Subscription<TransactionEvent> {
        self.0.subscribe()
    }
}

/// Services shared by all request handlers.
pub struct AppServices {
    ledger: Arc<Ledger<SharedLedgerStore>>,
    /// The account service's own answers to validation requests.
    accounts: LedgerValidator<SharedLedgerStore>,
    orchestrator: AppOrchestrator,
}

impl AppServices {
    pub fn new(
        ledger: Arc<Ledger<SharedLedgerStore>>,
        validator: SharedValidator,
        transactions: SharedTransactionStore,
        bus: SharedBus,
    ) -> Self {
        Self {
            accounts: LedgerValidator::new(ledger.clone()),
            ledger,
            orchestrator: Orchestrator::new(validator, transactions, bus),
        }
    }

    pub fn ledger(&self) -> &Ledger<SharedLedgerStore> {
        &self.ledger
    }

    pub fn accounts(&self) -> &LedgerValidator<SharedLedgerStore> {
        &self.accounts
    }

    pub fn orchestrator(&self) -> &AppOrchestrator {
        &self.orchestrator
    }
}

/// Pick persistent or in-memory adapters from `config`.
///
/// `handle` must belong to a multi-threaded runtime; it drives the Postgres
/// stores.
#[cfg_attr(not(feature = "persistent"), allow(unused_variables))]
pub fn build_services(config: &Config, handle: &Handle) -> anyhow::Result<(AppServices, WorkerHandle)> {
    match config.persistent_urls() {
        #[cfg(feature = "persistent")]
        Some((database_url, redis_url)) => build_persistent_services(config, handle, database_url, redis_url),
        #[cfg(not(feature = "persistent"))]
        Some(_) => anyhow::bail!(
            "DATABASE_URL and REDIS_URL are set but this build lacks the `persistent` feature"
        ),
        None => build_in_memory_services(config),
    }
}

/// In-memory wiring (dev/test): one process, one bus, one mutator thread.
pub fn build_in_memory_services(config: &Config) -> anyhow::Result<(AppServices, WorkerHandle)> {
    let store: SharedLedgerStore = Arc::new(InMemoryLedgerStore::new());
    let ledger = Arc::new(Ledger::with_config(store, config.ledger_config()));
    let bus: Arc<InMemoryEventBus<TransactionEvent>> = Arc::new(InMemoryEventBus::new());

    // Subscribe before the first publish.
    let worker = MutatorWorker::new(
        BalanceMutator::new(ledger.clone()),
        Arc::new(InMemoryDeadLetterSink::new()),
        config.mutator_retry(),
    )
    .spawn("ledger-mutator", &bus)
    .context("failed to spawn mutator worker")?;

    let services = AppServices::new(
        ledger.clone(),
        validator(config, &ledger)?,
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(ErasedBus(bus)),
    );

    info!(mode = "in-memory", "services ready");
    Ok((services, worker))
}

#[cfg(feature = "persistent")]
pub fn build_persistent_services(
    config: &Config,
    handle: &Handle,
    database_url: &str,
    redis_url: &str,
) -> anyhow::Result<(AppServices, WorkerHandle)> {
    use ledgerflow_infra::event_bus::{DEFAULT_PARTITIONS, RedisStreamsEventBus};
    use ledgerflow_infra::postgres::{self, PostgresLedgerStore, PostgresTransactionStore};
    use sqlx::PgPool;

    let pool = handle
        .block_on(PgPool::connect(database_url))
        .context("failed to connect to Postgres")?;
    handle
        .block_on(postgres::migrate(&pool))
        .context("failed to apply schema")?;

    let store: SharedLedgerStore = Arc::new(PostgresLedgerStore::new(pool.clone(), handle.clone()));
    let ledger = Arc::new(Ledger::with_config(store, config.ledger_config()));
    let transactions: SharedTransactionStore =
        Arc::new(PostgresTransactionStore::new(pool, handle.clone()));

    let bus = Arc::new(
        RedisStreamsEventBus::new(redis_url, DEFAULT_PARTITIONS)
            .context("failed to create Redis Streams event bus")?,
    );
    // One consumer owns every shard; a stable name lets it reclaim its pending entries.
    let consumer = bus
        .consumer(MUTATOR_GROUP, "mutator-0", (0..bus.partitions()).collect())
        .context("failed to create consumer group")?;

    let worker = MutatorWorker::new(
        BalanceMutator::new(ledger.clone()),
        bus.clone(),
        config.mutator_retry(),
    )
    .spawn_streams("ledger-mutator", consumer)
    .context("failed to spawn mutator worker")?;

    let services = AppServices::new(
        ledger.clone(),
        validator(config, &ledger)?,
        transactions,
        Arc::new(ErasedBus(bus)),
    );

    info!(mode = "persistent", partitions = DEFAULT_PARTITIONS, "services ready");
    Ok((services, worker))
}

/// Remote validator when an account service URL is configured, else the local ledger.
fn validator(config: &Config, ledger: &Arc<Ledger<SharedLedgerStore>>) -> anyhow::Result<SharedValidator> {
    match &config.account_service_url {
        Some(url) => {
            let client = HttpValidatorClient::new(url.clone(), config.validator_timeout)
                .context("failed to build account service client")?;
            info!(account_service_url = %url, "validating against remote account service");
            Ok(Arc::new(client))
        }
        None => Ok(Arc::new(LedgerValidator::new(ledger.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "persistent"))]
    #[test]
    fn persistent_urls_without_the_feature_refuse_to_start() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let config = Config {
            database_url: Some("postgres://localhost/ledgerflow".to_string()),
            redis_url: Some("redis://localhost".to_string()),
            ..Config::default()
        };

        let err = build_services(&config, runtime.handle()).err().unwrap();
        assert!(err.to_string().contains("persistent"));
    }

    #[test]
    fn no_urls_runs_in_memory() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        let (_services, worker) = build_services(&Config::default(), runtime.handle()).unwrap();
        worker.shutdown();
    }
}
