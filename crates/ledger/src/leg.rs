use serde::{Deserialize, Serialize};

use ledgerflow_core::{AccountId, Amount, Movement, TransactionId};

/// Direction of a single balance change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Debit,
    Credit,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Debit => "debit",
            Leg::Credit => "credit",
        }
    }
}

/// Idempotency key of one applied balance change: `(transaction, leg)`.
///
/// A transaction touches each leg at most once, so the account is implied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegKey {
    pub transaction_id: TransactionId,
    pub leg: Leg,
}

impl LegKey {
    pub fn debit(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            leg: Leg::Debit,
        }
    }

    pub fn credit(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            leg: Leg::Credit,
        }
    }
}

impl core::fmt::Display for LegKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.leg.as_str())
    }
}

/// One leg to apply: which account, which direction, how much.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LegPlan {
    pub key: LegKey,
    pub account: AccountId,
    pub amount: Amount,
}

/// Split a movement into its legs, debit first.
pub fn plan_legs(transaction_id: TransactionId, movement: &Movement) -> Vec<LegPlan> {
    match movement {
        Movement::Deposit { account, amount } => vec![LegPlan {
            key: LegKey::credit(transaction_id),
            account: *account,
            amount: *amount,
        }],
        Movement::Withdraw { account, amount } => vec![LegPlan {
            key: LegKey::debit(transaction_id),
            account: *account,
            amount: *amount,
        }],
        Movement::Transfer { route, amount } => vec![
            LegPlan {
                key: LegKey::debit(transaction_id),
                account: route.source(),
                amount: *amount,
            },
            LegPlan {
                key: LegKey::credit(transaction_id),
                account: route.destination(),
                amount: *amount,
            },
        ],
    }
}
