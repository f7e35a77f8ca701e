//! Infrastructure event channel implementations.
//!
//! The channel abstraction lives in `ledgerflow-events`; this module provides
//! broker-backed implementations.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{
    DEFAULT_PARTITIONS, RedisStreamsError, RedisStreamsEventBus, StreamConsumer, StreamDelivery,
    shards_for_member,
};
