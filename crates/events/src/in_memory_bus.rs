//! In-memory event bus for tests/dev.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("in-memory bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Fan-out to every live subscriber; a single lock serializes publishes, so
///   each subscriber observes one total order (and therefore per-key order)
/// - Built with [`with_replay_log`](Self::with_replay_log), keeps every published
///   message so [`redeliver`](Self::redeliver) can replay it, simulating broker
///   redelivery for at-least-once consumers. The default bus keeps nothing.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    inner: Mutex<Inner<M>>,
}

#[derive(Debug)]
struct Inner<M> {
    subscribers: Vec<mpsc::Sender<M>>,
    /// `None` unless the replay log is enabled.
    published: Option<Vec<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that records every published message for inspection and replay.
    ///
    /// The log is unbounded; meant for tests.
    pub fn with_replay_log() -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                published: Some(Vec::new()),
            }),
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                published: None,
            }),
        }
    }
}

impl<M> InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    /// Every message published so far, in publish order. Empty without a replay log.
    pub fn published(&self) -> Vec<M> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.published.clone())
            .unwrap_or_default()
    }

    /// Deliver every previously published message again, in the original order.
    ///
    /// Returns the number of messages redelivered.
    pub fn redeliver(&self) -> Result<usize, InMemoryBusError> {
        let mut inner = self.inner.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let replay = inner.published.clone().unwrap_or_default();
        for message in &replay {
            inner
                .subscribers
                .retain(|tx| tx.send(message.clone()).is_ok());
        }
        Ok(replay.len())
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        inner.subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        if let Some(log) = inner.published.as_mut() {
            log.push(message);
        }

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.push(tx);
        }

        Subscription::new(rx)
    }
}
