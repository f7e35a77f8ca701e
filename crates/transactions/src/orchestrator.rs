//! Validate, persist, emit.

use chrono::Utc;
use tracing::{info, warn};

use ledgerflow_core::{
    AccountId, Movement, PrincipalId, TransactionId, TransactionKind, Validator,
};
use ledgerflow_events::{EventBus, TransactionEvent};

use crate::error::TransactionError;
use crate::record::TransactionRecord;
use crate::request::{CheckedRequest, CreateTransaction};
use crate::store::TransactionStore;

/// The transaction service's write and read paths.
///
/// `create` runs, in order:
/// 1. ownership of the source account
/// 2. funds (withdrawals and transfers), which also places a hold
/// 3. destination checks (transfers): exists, same currency as the source
/// 4. persist the committed record
/// 5. publish the event
///
/// Nothing is persisted unless 1-3 pass. Nothing is published unless 4 succeeded.
#[derive(Debug)]
pub struct Orchestrator<V, S, B> {
    validator: V,
    store: S,
    bus: B,
}

impl<V, S, B> Orchestrator<V, S, B>
where
    V: Validator,
    S: TransactionStore,
    B: EventBus<TransactionEvent>,
{
    pub fn new(validator: V, store: S, bus: B) -> Self {
        Self {
            validator,
            store,
            bus,
        }
    }

    pub fn create(
        &self,
        request: &CreateTransaction,
        principal: PrincipalId,
    ) -> Result<TransactionRecord, TransactionError> {
        let request = request.check()?;
        let tx = TransactionId::new();

        self.authorize(request.source, principal)?;

        let held = request.kind.debits_source();
        if held
            && !self
                .validator
                .check_funds(request.source, request.amount, tx)?
        {
            info!(
                transaction_id = %tx,
                account_id = %request.source,
                amount = %request.amount,
                "insufficient funds"
            );
            return Err(TransactionError::InsufficientFunds(request.source));
        }

        match self.commit(tx, &request) {
            Ok(record) => Ok(record),
            Err(err) => {
                // After a publish failure the record exists; the hold lapses on its own.
                if held && !matches!(err, TransactionError::PublishFailure { .. }) {
                    self.release_hold(request.source, tx);
                }
                Err(err)
            }
        }
    }

    pub fn list(
        &self,
        account: AccountId,
        principal: PrincipalId,
    ) -> Result<Vec<TransactionRecord>, TransactionError> {
        self.authorize(account, principal)?;
        Ok(self.store.list_by_account(account)?)
    }

    pub fn get(
        &self,
        id: TransactionId,
        principal: PrincipalId,
    ) -> Result<TransactionRecord, TransactionError> {
        let record = self.store.get(id)?.ok_or(TransactionError::NotFound(id))?;
        self.authorize(record.movement.source(), principal)?;
        Ok(record)
    }

    fn authorize(&self, account: AccountId, principal: PrincipalId) -> Result<(), TransactionError> {
        match self.validator.check_ownership(account, principal) {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(account_id = %account, principal_id = %principal, "ownership check denied");
                Err(TransactionError::Unauthorized { account, principal })
            }
            Err(err) => {
                warn!(account_id = %account, error = %err, "ownership check unavailable");
                Err(err.into())
            }
        }
    }

    fn commit(
        &self,
        tx: TransactionId,
        request: &CheckedRequest,
    ) -> Result<TransactionRecord, TransactionError> {
        let movement = self.movement(request)?;

        let record = self
            .store
            .append(TransactionRecord::committed(tx, movement, Utc::now()))?;

        self.bus.publish(record.to_event()).map_err(|err| {
            warn!(transaction_id = %tx, error = %err, "event publish failed after commit");
            TransactionError::PublishFailure {
                transaction_id: tx,
                reason: err.to_string(),
            }
        })?;

        info!(
            transaction_id = %tx,
            account_id = %movement.source(),
            kind = %movement.kind(),
            amount = %movement.amount(),
            "transaction committed"
        );
        Ok(record)
    }

    fn movement(&self, request: &CheckedRequest) -> Result<Movement, TransactionError> {
        match request.kind {
            TransactionKind::Deposit => Ok(Movement::deposit(request.source, request.amount)),
            TransactionKind::Withdraw => Ok(Movement::withdraw(request.source, request.amount)),
            TransactionKind::Transfer => {
                let destination = request.destination.ok_or_else(|| {
                    TransactionError::InvalidDestination(
                        "transfer requires destinationAccountId".to_string(),
                    )
                })?;
                let movement = Movement::transfer(request.source, destination, request.amount)
                    .map_err(|e| TransactionError::InvalidDestination(e.to_string()))?;

                if !self.validator.check_exists(destination)? {
                    return Err(TransactionError::InvalidDestination(format!(
                        "account {destination} does not exist"
                    )));
                }
                if !self.validator.check_compatible(request.source, destination)? {
                    info!(
                        account_id = %request.source,
                        destination_account_id = %destination,
                        "destination currency differs from source"
                    );
                    return Err(TransactionError::InvalidDestination(format!(
                        "account {destination} does not accept the source account's currency"
                    )));
                }
                Ok(movement)
            }
        }
    }

    fn release_hold(&self, account: AccountId, tx: TransactionId) {
        if let Err(err) = self.validator.release_hold(account, tx) {
            warn!(transaction_id = %tx, account_id = %account, error = %err, "hold release failed");
        }
    }
}
