use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use ledgerflow_events::{EventBus, Subscription, TransactionEvent};
use ledgerflow_ledger::{BalanceMutator, LedgerStore, MutationError, MutationOutcome};

use crate::dead_letter::{DeadLetter, DeadLetterError, DeadLetterSink};
#[cfg(feature = "redis")]
use crate::event_bus::StreamConsumer;
use crate::retry::RetryPolicy;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Final fate of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Handled(MutationOutcome),
    DeadLettered { reason: String, attempts: u32 },
}

/// Drives a [`BalanceMutator`] from a subscription.
///
/// - Retryable failures are retried in place with backoff, which keeps
///   per-key order (nothing behind the event runs first)
/// - Permanent failures and exhausted retries go to the dead-letter sink
/// - A bad message never stops the loop
#[derive(Debug)]
pub struct MutatorWorker<S, D> {
    mutator: BalanceMutator<S>,
    dead_letters: D,
    retry: RetryPolicy,
}

impl<S, D> MutatorWorker<S, D>
where
    S: LedgerStore + 'static,
    D: DeadLetterSink + 'static,
{
    pub fn new(mutator: BalanceMutator<S>, dead_letters: D, retry: RetryPolicy) -> Self {
        Self {
            mutator,
            dead_letters,
            retry,
        }
    }

    /// Handle one delivery to completion.
    ///
    /// Only fails if the dead-letter sink itself is unavailable, in which case
    /// the delivery must not be acknowledged.
    pub fn process(&self, event: &TransactionEvent) -> Result<Disposition, DeadLetterError> {
        let mut retries = 0;

        loop {
            let err = match self.mutator.handle(event) {
                Ok(outcome) => return Ok(Disposition::Handled(outcome)),
                Err(err) => err,
            };

            if err.is_retryable() && self.retry.should_retry(retries) {
                retries += 1;
                let delay = self.retry.delay_for_retry(retries);
                debug!(
                    transaction_id = %event.transaction_id,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying event"
                );
                thread::sleep(delay);
                continue;
            }

            return self.dead_letter(event, &err, retries + 1);
        }
    }

    fn dead_letter(
        &self,
        event: &TransactionEvent,
        err: &MutationError,
        attempts: u32,
    ) -> Result<Disposition, DeadLetterError> {
        let reason = err.to_string();
        warn!(
            transaction_id = %event.transaction_id,
            account_id = %event.account_id,
            attempts,
            retryable = err.is_retryable(),
            error = %reason,
            "event dead-lettered"
        );

        self.dead_letters
            .send(DeadLetter::new(event.clone(), reason.clone(), attempts))?;
        Ok(Disposition::DeadLettered { reason, attempts })
    }

    /// Spawn a worker thread consuming `bus`.
    pub fn spawn<B>(self, name: &'static str, bus: &B) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<TransactionEvent> + ?Sized,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run(name, sub, shutdown_rx))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    /// Spawn a worker thread consuming Redis shard streams.
    ///
    /// Entries are acknowledged only once settled (handled or dead-lettered).
    /// An unsettled entry stops the batch and is re-read, keeping shard order.
    #[cfg(feature = "redis")]
    pub fn spawn_streams(
        self,
        name: &'static str,
        mut consumer: StreamConsumer,
    ) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            while shutdown_rx.try_recv().is_err() {
                let batch = match consumer.poll(16, 250) {
                    Ok(batch) => batch,
                    Err(err) => {
                        error!(worker = name, error = %err, "stream read failed");
                        thread::sleep(Duration::from_millis(250));
                        continue;
                    }
                };

                for delivery in batch {
                    let settled = match &delivery.event {
                        Ok(event) => self.process(event).map(|_| ()).map_err(|e| e.to_string()),
                        Err((reason, payload)) => consumer
                            .dead_letter_raw(&delivery, reason, payload)
                            .map_err(|e| e.to_string()),
                    };

                    let acked = settled.and_then(|()| consumer.ack(&delivery).map_err(|e| e.to_string()));
                    if let Err(err) = acked {
                        error!(worker = name, message_id = %delivery.id, error = %err, "entry not settled, will re-read");
                        consumer.rewind();
                        thread::sleep(Duration::from_millis(250));
                        break;
                    }
                }
            }
            debug!(worker = name, "stream worker stopped");
        })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    fn run(
        &self,
        name: &'static str,
        sub: Subscription<TransactionEvent>,
        shutdown_rx: mpsc::Receiver<()>,
    ) {
        let tick = Duration::from_millis(250);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match sub.recv_timeout(tick) {
                Ok(event) => {
                    if let Err(err) = self.process(&event) {
                        error!(
                            worker = name,
                            transaction_id = %event.transaction_id,
                            error = %err,
                            "event lost: dead-letter sink unavailable"
                        );
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!(worker = name, "mutator worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use ledgerflow_core::{AccountId, Amount, Currency, Movement, PrincipalId, TransactionId, Versioned};
    use ledgerflow_ledger::{InMemoryLedgerStore, Ledger};
    use rust_decimal_macros::dec;

    use crate::dead_letter::InMemoryDeadLetterSink;

    fn worker(
        retry: RetryPolicy,
    ) -> (
        Arc<Ledger<InMemoryLedgerStore>>,
        Arc<InMemoryDeadLetterSink>,
        MutatorWorker<InMemoryLedgerStore, Arc<InMemoryDeadLetterSink>>,
    ) {
        let ledger = Arc::new(Ledger::new(InMemoryLedgerStore::new()));
        let dlq = Arc::new(InMemoryDeadLetterSink::new());
        let worker = MutatorWorker::new(BalanceMutator::new(ledger.clone()), dlq.clone(), retry);
        (ledger, dlq, worker)
    }

    fn open(ledger: &Ledger<InMemoryLedgerStore>, balance: rust_decimal::Decimal) -> AccountId {
        *ledger
            .open_account(PrincipalId::new(), balance, Currency::new("USD").unwrap())
            .unwrap()
            .id()
    }

    #[test]
    fn exhausted_retries_are_dead_lettered() {
        let (ledger, dlq, worker) = worker(RetryPolicy::fixed(2, Duration::from_millis(1)));
        let a = open(&ledger, dec!(10));

        let event = TransactionEvent::new(
            TransactionId::new(),
            &Movement::withdraw(a, Amount::new(dec!(50)).unwrap()),
            Utc::now(),
        );

        let disposition = worker.process(&event).unwrap();
        assert!(matches!(disposition, Disposition::DeadLettered { attempts: 3, .. }));

        let letters = dlq.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].event, event);
        assert_eq!(ledger.account(a).unwrap().balance(), dec!(10));
    }

    #[test]
    fn permanent_failures_skip_retries() {
        let (ledger, dlq, worker) = worker(RetryPolicy::fixed(5, Duration::from_secs(60)));
        let a = open(&ledger, dec!(10));

        // Destination does not exist: no amount of waiting fixes that.
        let event = TransactionEvent::new(
            TransactionId::new(),
            &Movement::transfer(a, AccountId::new(), Amount::new(dec!(1)).unwrap()).unwrap(),
            Utc::now(),
        );

        let disposition = worker.process(&event).unwrap();
        assert!(matches!(disposition, Disposition::DeadLettered { attempts: 1, .. }));
        assert_eq!(dlq.letters().len(), 1);
    }
}
