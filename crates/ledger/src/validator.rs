use std::sync::Arc;

use ledgerflow_core::{
    AccountId, Amount, PrincipalId, TransactionId, ValidationUnavailable, Validator,
};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::store::LedgerStore;

/// In-process [`Validator`] answering straight from the ledger.
///
/// Unknown accounts answer `false`. Storage failures and exhausted conflict
/// retries are reported as unavailable, never as a denial.
#[derive(Debug)]
pub struct LedgerValidator<S> {
    ledger: Arc<Ledger<S>>,
}

impl<S> LedgerValidator<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self { ledger }
    }
}

impl<S> Clone for LedgerValidator<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

fn unavailable(err: LedgerError) -> ValidationUnavailable {
    ValidationUnavailable::Transport(err.to_string())
}

impl<S> Validator for LedgerValidator<S>
where
    S: LedgerStore,
{
    fn check_ownership(
        &self,
        account: AccountId,
        principal: PrincipalId,
    ) -> Result<bool, ValidationUnavailable> {
        let found = self.ledger.find_account(account).map_err(unavailable)?;
        Ok(found.is_some_and(|a| a.owner_id() == principal))
    }

    fn check_funds(
        &self,
        account: AccountId,
        amount: Amount,
        hold: TransactionId,
    ) -> Result<bool, ValidationUnavailable> {
        match self.ledger.reserve(account, amount, hold) {
            Ok(ok) => Ok(ok),
            Err(LedgerError::NotFound(_)) => Ok(false),
            Err(err) => Err(unavailable(err)),
        }
    }

    fn check_exists(&self, account: AccountId) -> Result<bool, ValidationUnavailable> {
        self.ledger
            .find_account(account)
            .map(|a| a.is_some())
            .map_err(unavailable)
    }

    fn check_compatible(
        &self,
        source: AccountId,
        destination: AccountId,
    ) -> Result<bool, ValidationUnavailable> {
        let source = self.ledger.find_account(source).map_err(unavailable)?;
        let destination = self.ledger.find_account(destination).map_err(unavailable)?;
        Ok(match (source, destination) {
            (Some(s), Some(d)) => s.currency() == d.currency(),
            _ => false,
        })
    }

    fn release_hold(
        &self,
        account: AccountId,
        hold: TransactionId,
    ) -> Result<(), ValidationUnavailable> {
        match self.ledger.release(account, hold) {
            Ok(()) | Err(LedgerError::NotFound(_)) => Ok(()),
            Err(err) => Err(unavailable(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerflow_core::{Currency, Versioned};
    use rust_decimal_macros::dec;

    use crate::store::InMemoryLedgerStore;

    #[test]
    fn answers_from_ledger_state() {
        let ledger = Arc::new(Ledger::new(InMemoryLedgerStore::new()));
        let owner = PrincipalId::new();
        let acc = ledger
            .open_account(owner, dec!(50), Currency::new("USD").unwrap())
            .unwrap();
        let id = *acc.id();
        let validator = LedgerValidator::new(ledger.clone());

        assert!(validator.check_ownership(id, owner).unwrap());
        assert!(!validator.check_ownership(id, PrincipalId::new()).unwrap());
        assert!(!validator.check_ownership(AccountId::new(), owner).unwrap());

        assert!(validator.check_exists(id).unwrap());
        assert!(!validator.check_exists(AccountId::new()).unwrap());

        let tx = TransactionId::new();
        let forty = Amount::new(dec!(40)).unwrap();
        assert!(validator.check_funds(id, forty, tx).unwrap());
        assert!(!validator.check_funds(id, forty, TransactionId::new()).unwrap());
        assert!(!validator.check_funds(AccountId::new(), forty, tx).unwrap());

        let usd = *ledger
            .open_account(PrincipalId::new(), dec!(0), Currency::new("USD").unwrap())
            .unwrap()
            .id();
        let eur = *ledger
            .open_account(PrincipalId::new(), dec!(0), Currency::new("EUR").unwrap())
            .unwrap()
            .id();
        assert!(validator.check_compatible(id, usd).unwrap());
        assert!(!validator.check_compatible(id, eur).unwrap());
        assert!(!validator.check_compatible(id, AccountId::new()).unwrap());

        validator.release_hold(id, tx).unwrap();
        validator.release_hold(AccountId::new(), tx).unwrap();
        assert_eq!(ledger.account(id).unwrap().available(chrono::Utc::now()), dec!(50));
    }
}
