//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the pub/sub contract the transaction service uses to hand
//! committed transactions to the account service's balance mutator.
//!
//! ## Delivery Contract
//!
//! - **At-least-once**: a message may be delivered more than once (broker
//!   redelivery, consumer crash before ack). Consumers must be idempotent.
//! - **Key-ordered**: messages sharing a partition key (see [`Partitioned`]) are
//!   delivered in publish order. Messages with different keys have no relative
//!   ordering guarantee.
//! - **No persistence**: the transaction store is the source of truth; the bus is
//!   for distribution only.
//!
//! [`Partitioned`]: crate::Partitioned

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published to the bus
/// (broadcast semantics).
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => handle(event),
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,  // Bus closed
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption. A subscription
/// preserves the bus's publish order, which is what gives consumers per-key
/// ordering.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic event bus.
///
/// ```text
/// Orchestrator → Transaction Store (persist) → EventBus (publish) → Balance Mutator
/// ```
///
/// Messages are **persisted first**, then published. `publish()` can fail (broker
/// unreachable, lock poisoned); the error is surfaced to the caller, who must
/// treat the record as committed-but-unpublished.
///
/// The trait requires `Send + Sync`; multiple threads may publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
