//! Redis Streams-backed event channel (durable, at-least-once, key-ordered).
//!
//! ## Layout
//!
//! - **Shard streams**: `{prefix}:{shard}` with `shard = shard_for(partition_key, partitions)`.
//!   All events of one account land on one stream, in publish order.
//! - **Consumer groups**: one per consuming service (e.g. `ledger.mutator`).
//! - **Consumers**: each consumer owns a disjoint set of shards, so a shard is
//!   only ever processed sequentially by one consumer.
//! - **Dead letters**: `{prefix}:dlq`.
//!
//! ## Delivery
//!
//! A [`StreamConsumer`] first re-reads its own pending entries (delivered before
//! a crash, never acknowledged), then new entries. Entries are acknowledged only
//! after the caller has handled them, so a crash in between means redelivery.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use ledgerflow_events::{EventBus, Partitioned, Subscription, TransactionEvent, shard_for};

use crate::dead_letter::{DeadLetter, DeadLetterError, DeadLetterSink};

const DEFAULT_PREFIX: &str = "ledgerflow:transactions";

/// Default number of shard streams.
pub const DEFAULT_PARTITIONS: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: Arc<redis::Client>,
    prefix: String,
    partitions: u32,
}

/// XREADGROUP reply: `[(stream, [(id, {field: value})])]`, nil on timeout.
type ReadReply = Option<Vec<(String, Vec<(String, HashMap<String, String>)>)>>;

impl RedisStreamsEventBus {
    pub fn new(redis_url: impl AsRef<str>, partitions: u32) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            prefix: DEFAULT_PREFIX.to_string(),
            partitions: partitions.max(1),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn stream_key(&self, shard: u32) -> String {
        format!("{}:{shard}", self.prefix)
    }

    pub fn dlq_key(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    #[instrument(
        skip(self, event),
        fields(
            transaction_id = %event.transaction_id,
            partition_key = %event.partition_key()
        ),
        err
    )]
    fn publish_sync(&self, event: &TransactionEvent) -> Result<(), RedisStreamsError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let key = event.partition_key();
        let stream = self.stream_key(shard_for(key, self.partitions));

        let mut conn = self.connection()?;
        let _: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("partition_key")
            .arg(key.to_string())
            .arg("transaction_id")
            .arg(event.transaction_id.to_string())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }

    /// Create `group` on every shard stream (idempotent).
    pub fn ensure_consumer_group(&self, group: &str) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;

        for shard in 0..self.partitions {
            let created: redis::RedisResult<String> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(self.stream_key(shard))
                .arg(group)
                .arg("0")
                .arg("MKSTREAM")
                .query(&mut conn);

            if let Err(e) = created {
                // BUSYGROUP: the group already exists.
                if e.code() != Some("BUSYGROUP") {
                    return Err(RedisStreamsError::ConsumerGroup(e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// A consumer named `consumer` in `group` reading `shards`.
    ///
    /// Give each live consumer of a group a disjoint shard set; see
    /// [`shards_for_member`].
    pub fn consumer(
        &self,
        group: &str,
        consumer: &str,
        shards: Vec<u32>,
    ) -> Result<StreamConsumer, RedisStreamsError> {
        self.ensure_consumer_group(group)?;
        Ok(StreamConsumer {
            bus: self.clone(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            streams: shards.into_iter().map(|s| self.stream_key(s)).collect(),
            recovering: true,
        })
    }
}

/// Shards owned by member `index` of `members` consumers.
pub fn shards_for_member(partitions: u32, index: u32, members: u32) -> Vec<u32> {
    let members = members.max(1);
    (0..partitions).filter(|s| s % members == index % members).collect()
}

/// One entry read from a shard stream.
#[derive(Debug, Clone)]
pub struct StreamDelivery {
    pub stream: String,
    pub id: String,
    /// The decoded event, or the reason it could not be decoded and the raw payload.
    pub event: Result<TransactionEvent, (String, String)>,
}

/// Reads shard streams on behalf of one consumer-group member.
#[derive(Debug)]
pub struct StreamConsumer {
    bus: RedisStreamsEventBus,
    group: String,
    consumer: String,
    streams: Vec<String>,
    recovering: bool,
}

impl StreamConsumer {
    /// Next batch, pending entries first. Blocks up to `block_ms` for new ones.
    pub fn poll(&mut self, count: usize, block_ms: u64) -> Result<Vec<StreamDelivery>, RedisStreamsError> {
        if self.streams.is_empty() {
            return Ok(Vec::new());
        }

        if self.recovering {
            let pending = self.read("0", count, None)?;
            if !pending.is_empty() {
                debug!(consumer = %self.consumer, count = pending.len(), "redelivering pending entries");
                return Ok(pending);
            }
            self.recovering = false;
        }

        self.read(">", count, Some(block_ms))
    }

    fn read(
        &self,
        from: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> Result<Vec<StreamDelivery>, RedisStreamsError> {
        let mut conn = self.bus.connection()?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(&self.streams);
        for _ in &self.streams {
            cmd.arg(from);
        }

        let reply: ReadReply = cmd
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        let mut deliveries = Vec::new();
        for (stream, entries) in reply.unwrap_or_default() {
            for (id, fields) in entries {
                let payload = fields.get("payload").cloned().unwrap_or_default();
                let event = serde_json::from_str::<TransactionEvent>(&payload)
                    .map_err(|e| (e.to_string(), payload));
                deliveries.push(StreamDelivery {
                    stream: stream.clone(),
                    id,
                    event,
                });
            }
        }
        Ok(deliveries)
    }

    /// Re-read pending entries on the next poll (after a delivery could not be
    /// settled).
    pub fn rewind(&mut self) {
        self.recovering = true;
    }

    /// Acknowledge a handled delivery.
    pub fn ack(&self, delivery: &StreamDelivery) -> Result<(), RedisStreamsError> {
        let mut conn = self.bus.connection()?;
        let _: u64 = redis::cmd("XACK")
            .arg(&delivery.stream)
            .arg(&self.group)
            .arg(&delivery.id)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    /// Park an undecodable entry on the dead-letter stream.
    pub fn dead_letter_raw(
        &self,
        delivery: &StreamDelivery,
        reason: &str,
        payload: &str,
    ) -> Result<(), RedisStreamsError> {
        let mut conn = self.bus.connection()?;
        let _: String = redis::cmd("XADD")
            .arg(self.bus.dlq_key())
            .arg("*")
            .arg("original_stream")
            .arg(&delivery.stream)
            .arg("original_message_id")
            .arg(&delivery.id)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg("payload")
            .arg(payload)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("DLQ XADD failed: {e}")))?;

        warn!(message_id = %delivery.id, reason, "undecodable entry sent to dead-letter stream");
        Ok(())
    }
}

impl DeadLetterSink for RedisStreamsEventBus {
    fn send(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        let payload = serde_json::to_string(&letter.event)
            .map_err(|e| DeadLetterError::Unavailable(e.to_string()))?;
        let mut conn = self
            .connection()
            .map_err(|e| DeadLetterError::Unavailable(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(self.dlq_key())
            .arg("*")
            .arg("transaction_id")
            .arg(letter.event.transaction_id.to_string())
            .arg("reason")
            .arg(&letter.reason)
            .arg("attempts")
            .arg(letter.attempts)
            .arg("failed_at")
            .arg(letter.dead_lettered_at.to_rfc3339())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| DeadLetterError::Unavailable(format!("DLQ XADD failed: {e}")))?;

        Ok(())
    }
}

impl EventBus<TransactionEvent> for RedisStreamsEventBus {
    type Error = RedisStreamsError;

    fn publish(&self, message: TransactionEvent) -> Result<(), Self::Error> {
        self.publish_sync(&message)
    }

    /// Channel-backed subscription over every shard, in a fresh consumer group.
    ///
    /// Entries are acknowledged once handed to the channel. Durable consumers
    /// should use [`consumer`](Self::consumer) and acknowledge after handling.
    fn subscribe(&self) -> Subscription<TransactionEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        let group = format!("subscription-{}", uuid::Uuid::now_v7());
        let shards = (0..self.partitions).collect();

        let mut consumer = match self.consumer(&group, "subscriber", shards) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to create subscription consumer group");
                return Subscription::new(rx);
            }
        };

        std::thread::spawn(move || {
            loop {
                let batch = match consumer.poll(32, 250) {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(error = %e, "failed to read from shard streams");
                        std::thread::sleep(std::time::Duration::from_millis(250));
                        continue;
                    }
                };

                for delivery in batch {
                    if let Ok(event) = &delivery.event {
                        if tx.send(event.clone()).is_err() {
                            return;
                        }
                    }
                    if let Err(e) = consumer.ack(&delivery) {
                        error!(error = %e, "failed to acknowledge entry");
                    }
                }
            }
        });

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_split_shards_disjointly() {
        let a = shards_for_member(8, 0, 3);
        let b = shards_for_member(8, 1, 3);
        let c = shards_for_member(8, 2, 3);
        assert_eq!(a, vec![0, 3, 6]);
        assert_eq!(b, vec![1, 4, 7]);
        assert_eq!(c, vec![2, 5]);
    }

    #[test]
    fn stream_keys_are_prefixed_per_shard() {
        let bus = RedisStreamsEventBus::new("redis://127.0.0.1:6379", 4)
            .unwrap()
            .with_prefix("test");
        assert_eq!(bus.stream_key(3), "test:3");
        assert_eq!(bus.dlq_key(), "test:dlq");
    }
}
