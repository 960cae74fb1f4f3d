//! # Message Entities
//!
//! Messages and identifiers that travel through a consumer's shared channel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Well-known message property keys used by retry routing.
pub mod properties {
    /// Number of times the message was sent back for reconsumption.
    pub const RECONSUME_TIMES: &str = "RECONSUMETIMES";
    /// Topic the message was originally published to.
    pub const REAL_TOPIC: &str = "REAL_TOPIC";
    /// Id of the message on its original topic.
    pub const ORIGIN_MESSAGE_ID: &str = "ORIGIN_MESSAGE_ID";
    /// Requested redelivery delay, in milliseconds.
    pub const DELAY_TIME: &str = "DELAY_TIME";
    /// Requested broker delay level.
    pub const DELAY_LEVEL: &str = "DELAY_LEVEL";
}

/// Identifier of one per-topic consumer session.
///
/// Used as a lookup key, never as an owning handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one message within its topic partition.
///
/// Carries an optional back-reference to the session that delivered it.
/// Ids built by other clients, or reconstructed from storage, have no origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    /// Ledger holding the entry.
    pub ledger_id: u64,
    /// Entry within the ledger.
    pub entry_id: u64,
    /// Index within a batch, `-1` for non-batched messages.
    pub batch_index: i32,
    /// Partition index, `-1` for non-partitioned topics.
    pub partition_index: i32,
    origin: Option<ConsumerId>,
}

impl MessageId {
    /// Create an id with no origin session.
    pub fn new(ledger_id: u64, entry_id: u64, batch_index: i32, partition_index: i32) -> Self {
        Self {
            ledger_id,
            entry_id,
            batch_index,
            partition_index,
            origin: None,
        }
    }

    /// Earliest position in a topic.
    pub fn earliest() -> Self {
        Self::new(u64::MAX, u64::MAX, -1, -1)
    }

    /// Latest position in a topic.
    pub fn latest() -> Self {
        Self::new(i64::MAX as u64, i64::MAX as u64, -1, -1)
    }

    /// Tag this id with the session that delivered it.
    #[must_use]
    pub fn with_origin(mut self, origin: ConsumerId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Session that delivered this message, if known.
    pub fn origin(&self) -> Option<ConsumerId> {
        self.origin
    }

    /// Whether two ids point at the same entry, ignoring origin.
    pub fn same_position(&self, other: &MessageId) -> bool {
        self.ledger_id == other.ledger_id
            && self.entry_id == other.entry_id
            && self.batch_index == other.batch_index
            && self.partition_index == other.partition_index
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.ledger_id, self.entry_id, self.batch_index, self.partition_index
        )
    }
}

/// A message received from a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, tagged with its origin session.
    pub id: MessageId,
    /// Topic as reported by the broker. May be formatted differently from
    /// the topic string the consumer subscribed with.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Optional routing key.
    pub key: Option<String>,
    /// User and system properties.
    pub properties: HashMap<String, String>,
    /// Broker publish time.
    pub publish_time: SystemTime,
    /// Application event time, if set by the producer.
    pub event_time: Option<SystemTime>,
    /// How many times this message has been redelivered.
    pub redelivery_count: u32,
}

impl Message {
    /// Create a message published now with no key or properties.
    pub fn new(id: MessageId, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            topic: topic.into(),
            payload: payload.into(),
            key: None,
            properties: HashMap::new(),
            publish_time: SystemTime::now(),
            event_time: None,
            redelivery_count: 0,
        }
    }

    /// Attach a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach a routing key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// How many times this message was already sent back for reconsumption.
    pub fn reconsume_times(&self) -> u32 {
        self.properties
            .get(properties::RECONSUME_TIMES)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// A message tagged with the session that pushed it into a shared channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerMessage {
    /// The received message.
    pub message: Message,
    /// Session that delivered the message.
    pub consumer: ConsumerId,
}

impl ConsumerMessage {
    /// Tag `message` with `consumer`, also stamping the origin onto its id.
    pub fn new(consumer: ConsumerId, mut message: Message) -> Self {
        message.id = message.id.with_origin(consumer);
        Self { message, consumer }
    }
}

/// A message to be published, e.g. to a retry or dead-letter topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerMessage {
    /// Raw payload.
    pub payload: Vec<u8>,
    /// Optional routing key.
    pub key: Option<String>,
    /// User and system properties.
    pub properties: HashMap<String, String>,
    /// Deliver no earlier than this delay after publication.
    pub deliver_after: Option<Duration>,
    /// Application event time.
    pub event_time: Option<SystemTime>,
}

impl ProducerMessage {
    /// Copy of `message` for republication, recording where it originally came from.
    pub fn from_message(message: &Message) -> Self {
        let mut props = message.properties.clone();
        props
            .entry(properties::REAL_TOPIC.to_string())
            .or_insert_with(|| message.topic.clone());
        props
            .entry(properties::ORIGIN_MESSAGE_ID.to_string())
            .or_insert_with(|| message.id.to_string());

        Self {
            payload: message.payload.clone(),
            key: message.key.clone(),
            properties: props,
            deliver_after: None,
            event_time: message.event_time,
        }
    }

    /// Build the message that sends `message` back for later reconsumption.
    ///
    /// Like [`ProducerMessage::from_message`], also bumping the reconsume counter.
    pub fn for_reconsume(message: &Message, deliver_after: Option<Duration>) -> Self {
        let mut produced = Self::from_message(message);
        produced.properties.insert(
            properties::RECONSUME_TIMES.to_string(),
            (message.reconsume_times() + 1).to_string(),
        );
        if let Some(delay) = deliver_after {
            produced.properties.insert(
                properties::DELAY_TIME.to_string(),
                delay.as_millis().to_string(),
            );
        }
        produced.deliver_after = deliver_after;
        produced
    }
}
