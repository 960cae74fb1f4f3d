//! Consumer configuration

use crate::domain::error::{ConsumerError, ConsumerResult};
use mq_types::TopicName;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Suffix of the default retry letter topic.
pub const RETRY_TOPIC_SUFFIX: &str = "-RETRY";

/// Suffix of the default dead letter topic.
pub const DLQ_TOPIC_SUFFIX: &str = "-DLQ";

/// Default capacity of the shared message channel.
pub const DEFAULT_RECEIVER_QUEUE_SIZE: usize = 1000;

/// How messages are dispatched among consumers sharing a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionType {
    /// A single consumer owns the subscription.
    #[default]
    Exclusive,
    /// Messages are round-robined across consumers.
    Shared,
    /// One active consumer, others take over on failure.
    Failover,
    /// Messages with the same key go to the same consumer.
    KeyShared,
}

impl SubscriptionType {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "exclusive" => Some(Self::Exclusive),
            "shared" => Some(Self::Shared),
            "failover" => Some(Self::Failover),
            "key_shared" | "keyshared" => Some(Self::KeyShared),
            _ => None,
        }
    }
}

/// Dead-letter policy for messages that keep failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqPolicy {
    /// Deliveries after which a message goes to the dead letter topic.
    pub max_deliveries: u32,
    /// Explicit dead letter topic; derived from the subscription when unset.
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
    /// Explicit retry letter topic; derived from the subscription when unset.
    #[serde(default)]
    pub retry_letter_topic: Option<String>,
}

impl Default for DlqPolicy {
    fn default() -> Self {
        Self {
            max_deliveries: 16,
            dead_letter_topic: None,
            retry_letter_topic: None,
        }
    }
}

/// Configuration of a (multi-topic) consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Subscription name shared by every topic session
    pub subscription_name: String,
    /// Dispatch mode
    pub subscription_type: SubscriptionType,
    /// Allow `reconsume_later`; adds the retry letter topic to the subscription
    pub enable_retry: bool,
    /// Capacity of the shared message channel
    pub receiver_queue_size: usize,
    /// Optional consumer name reported to the broker
    pub consumer_name: Option<String>,
    /// Delay before negatively acknowledged messages are redelivered
    #[serde(with = "duration_secs")]
    pub nack_redelivery_delay: Duration,
    /// Dead-letter policy
    pub dlq: Option<DlqPolicy>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            subscription_name: String::new(),
            subscription_type: SubscriptionType::default(),
            enable_retry: false,
            receiver_queue_size: DEFAULT_RECEIVER_QUEUE_SIZE,
            consumer_name: None,
            nack_redelivery_delay: Duration::from_secs(60),
            dlq: None,
        }
    }
}

impl ConsumerConfig {
    /// Configuration with the given subscription name and defaults elsewhere.
    pub fn new(subscription_name: impl Into<String>) -> Self {
        Self {
            subscription_name: subscription_name.into(),
            ..Self::default()
        }
    }

    /// Enable or disable retry routing.
    #[must_use]
    pub fn with_retry(mut self, enable: bool) -> Self {
        self.enable_retry = enable;
        self
    }

    /// Set the dispatch mode.
    #[must_use]
    pub fn with_subscription_type(mut self, subscription_type: SubscriptionType) -> Self {
        self.subscription_type = subscription_type;
        self
    }

    /// Set the shared channel capacity.
    #[must_use]
    pub fn with_receiver_queue_size(mut self, size: usize) -> Self {
        self.receiver_queue_size = size;
        self
    }

    /// Set the delay before nacked messages come back.
    #[must_use]
    pub fn with_nack_redelivery_delay(mut self, delay: Duration) -> Self {
        self.nack_redelivery_delay = delay;
        self
    }

    #[must_use]
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = Some(name.into());
        self
    }

    /// Set the dead-letter policy.
    #[must_use]
    pub fn with_dlq(mut self, policy: DlqPolicy) -> Self {
        self.dlq = Some(policy);
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MQ_SUBSCRIPTION_NAME`: Subscription name (default: empty, rejected by `validate`)
    /// - `MQ_SUBSCRIPTION_TYPE`: exclusive | shared | failover | key_shared (default: exclusive)
    /// - `MQ_ENABLE_RETRY`: Enable retry routing (default: false)
    /// - `MQ_RECEIVER_QUEUE_SIZE`: Shared channel capacity (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            subscription_name: env::var("MQ_SUBSCRIPTION_NAME").unwrap_or_default(),
            subscription_type: env::var("MQ_SUBSCRIPTION_TYPE")
                .ok()
                .and_then(|v| SubscriptionType::from_name(&v))
                .unwrap_or(defaults.subscription_type),
            enable_retry: env::var("MQ_ENABLE_RETRY")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.enable_retry),
            receiver_queue_size: env::var("MQ_RECEIVER_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.receiver_queue_size),
            ..defaults
        }
    }

    /// Reject configurations no consumer can be built from.
    pub fn validate(&self) -> ConsumerResult<()> {
        if self.subscription_name.trim().is_empty() {
            return Err(ConsumerError::InvalidConfig {
                reason: "subscription name is required".into(),
            });
        }
        if self.receiver_queue_size == 0 {
            return Err(ConsumerError::InvalidConfig {
                reason: "receiver queue size must be greater than zero".into(),
            });
        }
        if let Some(dlq) = &self.dlq {
            if dlq.max_deliveries == 0 {
                return Err(ConsumerError::InvalidConfig {
                    reason: "dlq max deliveries must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// Retry letter topic for a subscription that includes `topic`.
    ///
    /// An explicit `dlq.retry_letter_topic` wins; otherwise
    /// `{domain}://{namespace}/{subscription}-RETRY`.
    pub fn retry_letter_topic(&self, topic: &TopicName) -> String {
        self.dlq
            .as_ref()
            .and_then(|p| p.retry_letter_topic.clone())
            .unwrap_or_else(|| {
                topic.sibling(&format!("{}{}", self.subscription_name, RETRY_TOPIC_SUFFIX))
            })
    }

    /// Dead letter topic for a subscription that includes `topic`.
    pub fn dead_letter_topic(&self, topic: &TopicName) -> String {
        self.dlq
            .as_ref()
            .and_then(|p| p.dead_letter_topic.clone())
            .unwrap_or_else(|| {
                topic.sibling(&format!("{}{}", self.subscription_name, DLQ_TOPIC_SUFFIX))
            })
    }

    /// Retry and dead letter topics of a subscription over `topics`.
    ///
    /// Derived once, from the first topic, so every session of the
    /// subscription publishes to the same letter topics.
    pub fn letter_topics(&self, topics: &[String]) -> ConsumerResult<LetterTopics> {
        let first = topics.first().ok_or_else(|| ConsumerError::InvalidConfig {
            reason: "topic name is required".into(),
        })?;
        let first = TopicName::parse(first)?;
        Ok(LetterTopics {
            retry: self.retry_letter_topic(&first),
            dead_letter: self.dead_letter_topic(&first),
        })
    }

    /// Deliveries after which a nacked message goes to the dead letter topic.
    pub fn max_deliveries(&self) -> Option<u32> {
        self.dlq.as_ref().map(|p| p.max_deliveries)
    }

    /// Topics to actually subscribe to.
    ///
    /// Removes duplicates keeping first occurrence order. With retry enabled
    /// the retry letter topic is appended so retried messages come back
    /// through the same consumer.
    pub fn effective_topics(&self, topics: &[String]) -> ConsumerResult<Vec<String>> {
        let mut seen = std::collections::HashSet::new();
        let mut effective: Vec<String> = topics
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();

        if effective.is_empty() {
            return Err(ConsumerError::InvalidConfig {
                reason: "topic name is required".into(),
            });
        }

        if self.enable_retry {
            let retry_topic = self.letter_topics(&effective)?.retry;
            if !effective.contains(&retry_topic) {
                effective.push(retry_topic);
            }
        }

        Ok(effective)
    }
}

/// Letter topics shared by every session of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterTopics {
    /// Where `reconsume_later` publishes.
    pub retry: String,
    /// Where messages go once they exceed the dead-letter policy.
    pub dead_letter: String,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
