//! Idempotent application of transaction events to balances.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use ledgerflow_core::money::balance_limit;
use ledgerflow_core::{AccountId, Amount, Movement, TransactionId, TransferRoute};
use ledgerflow_events::{EventDecodeError, TransactionEvent};

use crate::error::LedgerError;
use crate::leg::{plan_legs, LegKey};
use crate::ledger::{Ledger, LegOutcome};
use crate::store::LedgerStore;

/// What handling one delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// At least one leg was applied by this delivery.
    Applied { legs: usize },
    /// Every leg had already been applied (redelivery).
    Duplicate,
    /// The event was skipped on purpose (unknown type).
    Dropped { reason: String },
}

/// Consumer-side failure.
///
/// Permanent failures (`Malformed`, `Rejected`) will never succeed on retry and
/// belong in a dead-letter sink. The rest may clear up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("event rejected: {0}")]
    Rejected(String),

    #[error("insufficient funds on account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl MutationError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MutationError::InsufficientFunds { .. }
                | MutationError::Conflict(_)
                | MutationError::Storage(_)
        )
    }
}

impl From<LedgerError> for MutationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                account,
                balance,
                requested,
            } => MutationError::InsufficientFunds {
                account,
                balance,
                requested,
            },
            LedgerError::Conflict(reason) => MutationError::Conflict(reason),
            LedgerError::LegAlreadyApplied(leg) => {
                MutationError::Conflict(format!("leg {leg} raced with another consumer"))
            }
            LedgerError::Storage(reason) => MutationError::Storage(reason),
            other @ (LedgerError::NotFound(_)
            | LedgerError::AlreadyExists(_)
            | LedgerError::BalanceLimit { .. }
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::Domain(_)) => MutationError::Rejected(other.to_string()),
        }
    }
}

/// Applies [`TransactionEvent`]s to the ledger with exactly-once effect.
///
/// Each event is split into legs (debit first) and every leg is applied under
/// its `(transaction, leg)` key, so redelivering an event, or retrying one
/// that crashed between legs, only applies what is missing.
#[derive(Debug)]
pub struct BalanceMutator<S> {
    ledger: Arc<Ledger<S>>,
}

impl<S> Clone for BalanceMutator<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<S> BalanceMutator<S>
where
    S: LedgerStore,
{
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self { ledger }
    }

    pub fn handle(&self, event: &TransactionEvent) -> Result<MutationOutcome, MutationError> {
        let tx = event.transaction_id;

        let movement = match event.decode() {
            Ok(movement) => movement,
            Err(EventDecodeError::UnknownType(raw)) => {
                warn!(transaction_id = %tx, event_type = %raw, "dropping event of unknown type");
                return Ok(MutationOutcome::Dropped {
                    reason: format!("unknown transaction type '{raw}'"),
                });
            }
            Err(err @ EventDecodeError::Malformed { .. }) => {
                return Err(MutationError::Malformed(err.to_string()));
            }
        };

        if let Movement::Transfer { route, amount } = movement {
            self.preflight_transfer(tx, route, amount)?;
        }

        let mut applied = 0;
        for plan in plan_legs(tx, &movement) {
            match self.ledger.apply_leg(&plan)? {
                LegOutcome::Applied(_) => applied += 1,
                LegOutcome::AlreadyApplied => {
                    debug!(
                        transaction_id = %tx,
                        leg = plan.key.leg.as_str(),
                        "leg already applied, skipping"
                    );
                }
            }
        }

        if applied == 0 {
            info!(transaction_id = %tx, kind = %movement.kind(), "duplicate delivery");
            Ok(MutationOutcome::Duplicate)
        } else {
            info!(transaction_id = %tx, kind = %movement.kind(), legs = applied, "event applied");
            Ok(MutationOutcome::Applied { legs: applied })
        }
    }

    /// A transfer must not move money out unless it can land on the other side.
    ///
    /// Skipped once the debit is in: from then on the credit must go through.
    fn preflight_transfer(
        &self,
        tx: TransactionId,
        route: TransferRoute,
        amount: Amount,
    ) -> Result<(), MutationError> {
        if self.ledger.is_applied(LegKey::debit(tx))? {
            return Ok(());
        }

        let source = self.ledger.account(route.source())?;
        let destination = self
            .ledger
            .find_account(route.destination())?
            .ok_or_else(|| {
                MutationError::Rejected(format!(
                    "transfer destination {} does not exist",
                    route.destination()
                ))
            })?;

        if source.currency() != destination.currency() {
            return Err(LedgerError::CurrencyMismatch {
                source_currency: source.currency().clone(),
                destination_currency: destination.currency().clone(),
            }
            .into());
        }

        // Once the debit is in the credit cannot be refused, so check the ceiling first.
        if destination
            .balance()
            .checked_add(amount.value())
            .is_none_or(|b| b >= balance_limit())
        {
            return Err(LedgerError::BalanceLimit {
                account: route.destination(),
                balance: destination.balance(),
                credited: amount.value(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledgerflow_core::{Amount, Currency, PrincipalId, Versioned};
    use ledgerflow_events::EventType;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::leg::LegPlan;
    use crate::store::InMemoryLedgerStore;

    struct Fixture {
        ledger: Arc<Ledger<InMemoryLedgerStore>>,
        mutator: BalanceMutator<InMemoryLedgerStore>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(Ledger::new(InMemoryLedgerStore::new()));
        Fixture {
            mutator: BalanceMutator::new(ledger.clone()),
            ledger,
        }
    }

    impl Fixture {
        fn open(&self, balance: Decimal, currency: &str) -> AccountId {
            *self
                .ledger
                .open_account(PrincipalId::new(), balance, Currency::new(currency).unwrap())
                .unwrap()
                .id()
        }

        fn balance(&self, id: AccountId) -> Decimal {
            self.ledger.account(id).unwrap().balance()
        }
    }

    fn amount(v: Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    fn event(movement: Movement) -> TransactionEvent {
        TransactionEvent::new(TransactionId::new(), &movement, Utc::now())
    }

    #[test]
    fn transfer_moves_funds_once_despite_redelivery() {
        let f = fixture();
        let a = f.open(dec!(100), "USD");
        let b = f.open(dec!(0), "USD");
        let ev = event(Movement::transfer(a, b, amount(dec!(40))).unwrap());

        assert_eq!(f.mutator.handle(&ev).unwrap(), MutationOutcome::Applied { legs: 2 });
        assert_eq!(f.mutator.handle(&ev).unwrap(), MutationOutcome::Duplicate);

        assert_eq!(f.balance(a), dec!(60));
        assert_eq!(f.balance(b), dec!(40));
    }

    #[test]
    fn crash_between_legs_applies_only_the_missing_leg() {
        let f = fixture();
        let a = f.open(dec!(100), "USD");
        let b = f.open(dec!(0), "USD");
        let ev = event(Movement::transfer(a, b, amount(dec!(25))).unwrap());

        // Debit made it, the consumer died before the credit.
        f.ledger
            .apply_leg(&LegPlan {
                key: LegKey::debit(ev.transaction_id),
                account: a,
                amount: amount(dec!(25)),
            })
            .unwrap();

        assert_eq!(f.mutator.handle(&ev).unwrap(), MutationOutcome::Applied { legs: 1 });
        assert_eq!(f.balance(a), dec!(75));
        assert_eq!(f.balance(b), dec!(25));
    }

    #[test]
    fn overdrawing_withdrawal_fails_closed_and_is_retryable() {
        let f = fixture();
        let a = f.open(dec!(30), "USD");
        let ev = event(Movement::withdraw(a, amount(dec!(50))));

        let err = f.mutator.handle(&ev).unwrap_err();
        assert!(matches!(err, MutationError::InsufficientFunds { .. }));
        assert!(err.is_retryable());
        assert_eq!(f.balance(a), dec!(30));

        // Funds arrive; the retried delivery goes through.
        f.mutator
            .handle(&event(Movement::deposit(a, amount(dec!(20)))))
            .unwrap();
        assert_eq!(f.mutator.handle(&ev).unwrap(), MutationOutcome::Applied { legs: 1 });
        assert_eq!(f.balance(a), dec!(0));
    }

    #[test]
    fn transfer_to_missing_or_foreign_currency_account_is_rejected() {
        let f = fixture();
        let a = f.open(dec!(100), "USD");
        let eur = f.open(dec!(0), "EUR");

        let missing = event(Movement::transfer(a, AccountId::new(), amount(dec!(10))).unwrap());
        let err = f.mutator.handle(&missing).unwrap_err();
        assert!(matches!(err, MutationError::Rejected(_)));
        assert!(!err.is_retryable());

        let foreign = event(Movement::transfer(a, eur, amount(dec!(10))).unwrap());
        assert!(matches!(
            f.mutator.handle(&foreign),
            Err(MutationError::Rejected(_))
        ));

        // Neither leg moved money.
        assert_eq!(f.balance(a), dec!(100));
        assert_eq!(f.balance(eur), dec!(0));
    }

    #[test]
    fn oversized_deposits_are_permanent_failures_not_crashes() {
        let f = fixture();
        let full = balance_limit() - dec!(1);
        let a = f.open(full, "USD");

        let mut huge = event(Movement::deposit(a, amount(dec!(1))));
        huge.amount = Decimal::MAX;
        let err = f.mutator.handle(&huge).unwrap_err();
        assert!(matches!(err, MutationError::Malformed(_)));

        let err = f
            .mutator
            .handle(&event(Movement::deposit(a, amount(dec!(10)))))
            .unwrap_err();
        assert!(matches!(err, MutationError::Rejected(_)), "{err:?}");
        assert!(!err.is_retryable());
        assert_eq!(f.balance(a), full);
    }

    #[test]
    fn unknown_type_is_dropped_and_malformed_is_permanent() {
        let f = fixture();
        let a = f.open(dec!(10), "USD");

        let mut unknown = event(Movement::deposit(a, amount(dec!(1))));
        unknown.kind = EventType::Unknown("REFUND".to_string());
        assert!(matches!(
            f.mutator.handle(&unknown).unwrap(),
            MutationOutcome::Dropped { .. }
        ));

        let mut malformed = event(Movement::deposit(a, amount(dec!(1))));
        malformed.amount = dec!(-1);
        let err = f.mutator.handle(&malformed).unwrap_err();
        assert!(matches!(err, MutationError::Malformed(_)));
        assert!(!err.is_retryable());

        assert_eq!(f.balance(a), dec!(10));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: delivering the same event N >= 1 times has the effect of
        /// delivering it once.
        #[test]
        fn redelivery_is_idempotent(
            cents in 1i64..20_000,
            kind in 0u8..3,
            deliveries in 1usize..6
        ) {
            let f = fixture();
            let a = f.open(dec!(100), "USD");
            let b = f.open(dec!(0), "USD");
            let amt = amount(Decimal::new(cents, 2));
            let movement = match kind {
                0 => Movement::deposit(a, amt),
                1 => Movement::withdraw(a, amt),
                _ => Movement::transfer(a, b, amt).unwrap(),
            };
            let ev = event(movement);

            let first = f.mutator.handle(&ev);
            let after_once = (f.balance(a), f.balance(b));

            for _ in 1..deliveries {
                let again = f.mutator.handle(&ev);
                match &first {
                    Ok(_) => prop_assert_eq!(again, Ok(MutationOutcome::Duplicate)),
                    Err(e) => prop_assert_eq!(again.as_ref().err(), Some(e)),
                }
            }

            prop_assert_eq!((f.balance(a), f.balance(b)), after_once);
            prop_assert!(f.balance(a) >= Decimal::ZERO);
        }

        /// Property: balances stay non-negative under any interleaving of
        /// withdrawals and transfers, and the total is conserved by transfers.
        #[test]
        fn balances_never_go_negative(
            ops in prop::collection::vec((0u8..3, 1i64..10_000), 1..30)
        ) {
            let f = fixture();
            let a = f.open(dec!(50), "USD");
            let b = f.open(dec!(50), "USD");
            let mut withdrawn = Decimal::ZERO;

            for (op, cents) in ops {
                let amt = amount(Decimal::new(cents, 2));
                let movement = match op {
                    0 => Movement::withdraw(a, amt),
                    1 => Movement::transfer(a, b, amt).unwrap(),
                    _ => Movement::transfer(b, a, amt).unwrap(),
                };
                if f.mutator.handle(&event(movement)).is_ok() && op == 0 {
                    withdrawn += amt.value();
                }
                prop_assert!(f.balance(a) >= Decimal::ZERO);
                prop_assert!(f.balance(b) >= Decimal::ZERO);
            }

            prop_assert_eq!(f.balance(a) + f.balance(b) + withdrawn, dec!(100));
        }
    }
}
