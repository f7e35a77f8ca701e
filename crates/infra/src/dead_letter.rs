//! Where undeliverable transaction events end up.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerflow_events::TransactionEvent;

/// An event the mutator gave up on, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: TransactionEvent,
    pub reason: String,
    /// Handling attempts made, including the first.
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(event: TransactionEvent, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            event,
            reason: reason.into(),
            attempts,
            dead_lettered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead-letter sink unavailable: {0}")]
    Unavailable(String),
}

pub trait DeadLetterSink: Send + Sync {
    fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError>;
}

impl<D> DeadLetterSink for std::sync::Arc<D>
where
    D: DeadLetterSink + ?Sized,
{
    fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        (**self).send(letter)
    }
}

/// Keeps dead letters in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        self.letters
            .lock()
            .map_err(|_| DeadLetterError::Unavailable("lock poisoned".to_string()))?
            .push(letter);
        Ok(())
    }
}
