//! Account state: balance, currency, optimistic version and funds holds.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerflow_core::money::{balance_limit, check_scale};
use ledgerflow_core::{
    AccountId, Amount, Currency, DomainError, PrincipalId, TransactionId, Versioned,
};

use crate::error::LedgerError;

/// Amount reserved against an account's available funds by a funds check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hold {
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of trying to reserve funds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HoldOutcome {
    /// A new hold was recorded.
    Placed,
    /// A live hold for the same transaction already exists (repeated check).
    AlreadyHeld,
    /// Available funds do not cover the amount. Nothing was recorded.
    Insufficient,
}

/// A single account.
///
/// Invariant: `balance >= 0` after every committed write. `version` counts committed
/// writes and is advanced by the store, never by the account itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    id: AccountId,
    owner_id: PrincipalId,
    balance: Decimal,
    currency: Currency,
    pub(crate) version: u64,
    #[serde(default)]
    holds: BTreeMap<TransactionId, Hold>,
}

impl Account {
    /// Open a new account. The initial balance may be zero but not negative.
    pub fn open(
        id: AccountId,
        owner_id: PrincipalId,
        initial_balance: Decimal,
        currency: Currency,
    ) -> Result<Self, LedgerError> {
        if initial_balance < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "initial balance must not be negative (got {initial_balance})"
            ))
            .into());
        }
        if initial_balance >= balance_limit() {
            return Err(DomainError::validation(format!(
                "initial balance must be less than {} (got {initial_balance})",
                balance_limit()
            ))
            .into());
        }
        check_scale(initial_balance)?;

        Ok(Self {
            id,
            owner_id,
            balance: initial_balance,
            currency,
            version: 0,
            holds: BTreeMap::new(),
        })
    }

    /// Rebuild an account from persisted state.
    pub fn restore(
        id: AccountId,
        owner_id: PrincipalId,
        balance: Decimal,
        currency: Currency,
        version: u64,
        holds: BTreeMap<TransactionId, Hold>,
    ) -> Self {
        Self {
            id,
            owner_id,
            balance,
            currency,
            version,
            holds,
        }
    }

    pub fn owner_id(&self) -> PrincipalId {
        self.owner_id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn holds(&self) -> &BTreeMap<TransactionId, Hold> {
        &self.holds
    }

    /// Sum of live holds.
    pub fn held(&self, now: DateTime<Utc>) -> Decimal {
        self.holds
            .values()
            .filter(|h| h.is_live(now))
            .map(|h| h.amount.value())
            .sum()
    }

    /// Balance not yet promised to an in-flight withdrawal or transfer.
    pub fn available(&self, now: DateTime<Utc>) -> Decimal {
        self.balance - self.held(now)
    }

    /// Drop expired holds. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.holds.len();
        self.holds.retain(|_, h| h.is_live(now));
        before - self.holds.len()
    }

    /// Reserve `amount` for transaction `tx` if the available funds cover it.
    pub fn place_hold(
        &mut self,
        tx: TransactionId,
        amount: Amount,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> HoldOutcome {
        self.prune_expired(now);

        if self.holds.contains_key(&tx) {
            return HoldOutcome::AlreadyHeld;
        }
        if self.available(now) < amount.value() {
            return HoldOutcome::Insufficient;
        }

        self.holds.insert(
            tx,
            Hold {
                amount,
                expires_at: now + ttl,
            },
        );
        HoldOutcome::Placed
    }

    /// Remove the hold of `tx`. Returns whether one existed.
    pub fn release_hold(&mut self, tx: TransactionId) -> bool {
        self.holds.remove(&tx).is_some()
    }

    /// Add `amount` to the balance.
    ///
    /// Fails without touching any state if the result would reach the balance limit.
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let limit_hit = || LedgerError::BalanceLimit {
            account: self.id,
            balance: self.balance,
            credited: amount.value(),
        };

        let balance = self.balance.checked_add(amount.value()).ok_or_else(limit_hit)?;
        if balance >= balance_limit() {
            return Err(limit_hit());
        }

        self.balance = balance;
        Ok(())
    }

    /// Debit `amount` on behalf of `tx`, consuming its hold.
    ///
    /// Fails without touching any state if the balance would go negative.
    pub fn debit(&mut self, tx: TransactionId, amount: Amount) -> Result<(), LedgerError> {
        if self.balance < amount.value() {
            return Err(LedgerError::InsufficientFunds {
                account: self.id,
                balance: self.balance,
                requested: amount.value(),
            });
        }

        self.holds.remove(&tx);
        self.balance -= amount.value();
        Ok(())
    }
}

impl Versioned for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn amount(v: Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    fn account(balance: Decimal) -> Account {
        Account::open(AccountId::new(), PrincipalId::new(), balance, usd()).unwrap()
    }

    #[test]
    fn open_rejects_negative_balance() {
        let err = Account::open(AccountId::new(), PrincipalId::new(), dec!(-1), usd()).unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::Validation(_))));
        assert_eq!(account(dec!(0)).balance(), dec!(0));
    }

    #[test]
    fn holds_reduce_available_until_they_expire() {
        let now = Utc::now();
        let ttl = Duration::minutes(5);
        let mut acc = account(dec!(100));

        let first = TransactionId::new();
        assert_eq!(acc.place_hold(first, amount(dec!(70)), now, ttl), HoldOutcome::Placed);
        assert_eq!(acc.available(now), dec!(30));

        // Second withdrawal cannot be validated against the same funds.
        let second = TransactionId::new();
        assert_eq!(
            acc.place_hold(second, amount(dec!(50)), now, ttl),
            HoldOutcome::Insufficient
        );

        // Repeating the check for the same transaction is idempotent.
        assert_eq!(
            acc.place_hold(first, amount(dec!(70)), now, ttl),
            HoldOutcome::AlreadyHeld
        );

        // Once the hold lapses, the funds are available again.
        let later = now + ttl + Duration::seconds(1);
        assert_eq!(acc.available(later), dec!(100));
        assert_eq!(
            acc.place_hold(second, amount(dec!(50)), later, ttl),
            HoldOutcome::Placed
        );
        assert!(!acc.holds().contains_key(&first));
    }

    #[test]
    fn debit_consumes_hold_and_never_overdraws() {
        let now = Utc::now();
        let mut acc = account(dec!(30));
        let tx = TransactionId::new();
        acc.place_hold(tx, amount(dec!(30)), now, Duration::minutes(5));

        let err = acc.debit(TransactionId::new(), amount(dec!(50))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(acc.balance(), dec!(30));
        assert_eq!(acc.holds().len(), 1);

        acc.debit(tx, amount(dec!(30))).unwrap();
        assert_eq!(acc.balance(), dec!(0));
        assert!(acc.holds().is_empty());
    }

    #[test]
    fn open_rejects_balances_storage_cannot_hold() {
        let open = |balance| Account::open(AccountId::new(), PrincipalId::new(), balance, usd());

        assert!(matches!(
            open(dec!(0.00000000001)),
            Err(LedgerError::Domain(DomainError::Validation(_)))
        ));
        assert!(open(balance_limit()).is_err());
        assert!(open(Decimal::MAX).is_err());
        assert!(open(dec!(10.0000000001)).is_ok());
    }

    #[test]
    fn credit_past_the_limit_fails_and_leaves_balance_untouched() {
        let near = balance_limit() - dec!(10);
        let mut acc = account(near);
        let big = amount(dec!(999999999999999));

        let err = acc.credit(big).unwrap_err();
        assert!(matches!(err, LedgerError::BalanceLimit { .. }));
        assert_eq!(acc.balance(), near);

        acc.credit(amount(dec!(5))).unwrap();
        assert_eq!(acc.balance(), near + dec!(5));
        assert!(acc.credit(amount(dec!(5))).is_err());
    }

    #[test]
    fn release_is_a_no_op_for_unknown_holds() {
        let mut acc = account(dec!(10));
        assert!(!acc.release_hold(TransactionId::new()));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Credit(i64),
        Debit(i64),
        Hold(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..10_000).prop_map(Op::Credit),
            (1i64..10_000).prop_map(Op::Debit),
            (1i64..10_000).prop_map(Op::Hold),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of credits, debits and holds drives the balance
        /// below zero.
        #[test]
        fn balance_is_never_negative(
            initial in 0i64..10_000,
            ops in prop::collection::vec(op(), 1..40)
        ) {
            let now = Utc::now();
            let mut acc = account(Decimal::new(initial, 2));

            for op in ops {
                match op {
                    Op::Credit(cents) => acc.credit(amount(Decimal::new(cents, 2))).unwrap(),
                    Op::Debit(cents) => {
                        let _ = acc.debit(TransactionId::new(), amount(Decimal::new(cents, 2)));
                    }
                    Op::Hold(cents) => {
                        acc.place_hold(
                            TransactionId::new(),
                            amount(Decimal::new(cents, 2)),
                            now,
                            Duration::minutes(5),
                        );
                    }
                }
                prop_assert!(acc.balance() >= Decimal::ZERO);
            }
        }
    }
}
