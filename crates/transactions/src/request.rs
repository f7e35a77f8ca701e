use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerflow_core::{AccountId, Amount, DomainError, TransactionKind};

/// Raw create-transaction request as it arrives from a caller.
///
/// ```json
/// {"accountId": "...", "amount": "40.00", "type": "TRANSFER", "destinationAccountId": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    pub account_id: AccountId,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_account_id: Option<AccountId>,
}

/// A request whose shape has been checked.
///
/// The transfer destination is kept raw on purpose: a missing or self-pointing
/// destination is reported as an invalid destination only after the ownership
/// and funds checks have passed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CheckedRequest {
    pub source: AccountId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub destination: Option<AccountId>,
}

impl CreateTransaction {
    pub fn deposit(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            kind: TransactionKind::Deposit,
            destination_account_id: None,
        }
    }

    pub fn withdraw(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            kind: TransactionKind::Withdraw,
            destination_account_id: None,
        }
    }

    pub fn transfer(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            account_id: source,
            amount,
            kind: TransactionKind::Transfer,
            destination_account_id: Some(destination),
        }
    }

    pub fn check(&self) -> Result<CheckedRequest, DomainError> {
        let amount = Amount::new(self.amount)?;

        if self.kind != TransactionKind::Transfer && self.destination_account_id.is_some() {
            return Err(DomainError::validation(format!(
                "destinationAccountId is not allowed for {}",
                self.kind
            )));
        }

        Ok(CheckedRequest {
            source: self.account_id,
            amount,
            kind: self.kind,
            destination: self.destination_account_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_wire_shape() {
        let a = AccountId::new();
        let raw = serde_json::json!({"accountId": a, "amount": "12.30", "type": "WITHDRAW"});
        let req: CreateTransaction = serde_json::from_value(raw).unwrap();
        assert_eq!(req, CreateTransaction::withdraw(a, dec!(12.30)));
    }

    #[test]
    fn amount_and_destination_shape_are_checked() {
        let a = AccountId::new();
        assert!(matches!(
            CreateTransaction::deposit(a, dec!(0)).check(),
            Err(DomainError::Validation(_))
        ));

        let mut with_dest = CreateTransaction::deposit(a, dec!(1));
        with_dest.destination_account_id = Some(AccountId::new());
        assert!(matches!(with_dest.check(), Err(DomainError::Validation(_))));

        // Self-transfer passes the shape check; it fails later as an invalid destination.
        let checked = CreateTransaction::transfer(a, a, dec!(1)).check().unwrap();
        assert_eq!(checked.destination, Some(a));
    }
}
