//! Closed model of what a transaction does to balances.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::AccountId;
use crate::money::Amount;

/// Wire-level transaction type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdraw => "WITHDRAW",
            TransactionKind::Transfer => "TRANSFER",
        }
    }

    /// Whether the source account loses funds (and therefore needs a funds check).
    pub fn debits_source(&self) -> bool {
        matches!(self, TransactionKind::Withdraw | TransactionKind::Transfer)
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and destination of a transfer. Always two distinct accounts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRoute")]
pub struct TransferRoute {
    source: AccountId,
    destination: AccountId,
}

#[derive(Deserialize)]
struct RawRoute {
    source: AccountId,
    destination: AccountId,
}

impl TryFrom<RawRoute> for TransferRoute {
    type Error = DomainError;

    fn try_from(raw: RawRoute) -> Result<Self, Self::Error> {
        TransferRoute::new(raw.source, raw.destination)
    }
}

impl TransferRoute {
    pub fn new(source: AccountId, destination: AccountId) -> DomainResult<Self> {
        if source == destination {
            return Err(DomainError::invariant(
                "transfer destination must differ from source",
            ));
        }
        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> AccountId {
        self.source
    }

    pub fn destination(&self) -> AccountId {
        self.destination
    }
}

/// A validated movement of money.
///
/// Each constructor carries only the fields it needs: only a transfer has a
/// destination, and a transfer's route can never point back at its source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Movement {
    Deposit { account: AccountId, amount: Amount },
    Withdraw { account: AccountId, amount: Amount },
    Transfer {
        #[serde(flatten)]
        route: TransferRoute,
        amount: Amount,
    },
}

impl Movement {
    pub fn deposit(account: AccountId, amount: Amount) -> Self {
        Movement::Deposit { account, amount }
    }

    pub fn withdraw(account: AccountId, amount: Amount) -> Self {
        Movement::Withdraw { account, amount }
    }

    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        amount: Amount,
    ) -> DomainResult<Self> {
        Ok(Movement::Transfer {
            route: TransferRoute::new(source, destination)?,
            amount,
        })
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Movement::Deposit { .. } => TransactionKind::Deposit,
            Movement::Withdraw { .. } => TransactionKind::Withdraw,
            Movement::Transfer { .. } => TransactionKind::Transfer,
        }
    }

    /// The account the movement is initiated from (the only account for deposits
    /// and withdrawals).
    pub fn source(&self) -> AccountId {
        match self {
            Movement::Deposit { account, .. } | Movement::Withdraw { account, .. } => *account,
            Movement::Transfer { route, .. } => route.source(),
        }
    }

    pub fn destination(&self) -> Option<AccountId> {
        match self {
            Movement::Transfer { route, .. } => Some(route.destination()),
            _ => None,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            Movement::Deposit { amount, .. }
            | Movement::Withdraw { amount, .. }
            | Movement::Transfer { amount, .. } => *amount,
        }
    }

    /// Whether `account` is touched by this movement.
    pub fn involves(&self, account: AccountId) -> bool {
        self.source() == account || self.destination() == Some(account)
    }
}
