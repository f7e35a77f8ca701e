//! `ledgerflow-core` — shared building blocks for the account and transaction services.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod money;
pub mod movement;
pub mod validator;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, PrincipalId, TransactionId};
pub use money::{Amount, Currency};
pub use movement::{Movement, TransactionKind, TransferRoute};
pub use validator::{ValidationUnavailable, Validator};
pub use version::{ExpectedVersion, Versioned};
