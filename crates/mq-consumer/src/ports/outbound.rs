//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Collaborators the multi-topic consumer composes but does not implement:
//! per-topic sessions, the subscriber that creates them, and the
//! dead-letter router.

use crate::domain::channel::SharedChannel;
use crate::domain::config::ConsumerConfig;
use crate::domain::error::ConsumerResult;
use crate::domain::types::{ReconsumeCallback, ReconsumeOptions};
use async_trait::async_trait;
use futures::Stream;
use mq_types::{ConsumerId, Message, MessageId, ProducerMessage};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// One subscription session bound to exactly one topic.
///
/// Sessions push every decoded message, tagged with [`TopicConsumer::id`],
/// into the shared channel they were created with.
#[async_trait]
pub trait TopicConsumer: Send + Sync {
    /// Lookup key carried by the ids of messages this session delivers.
    fn id(&self) -> ConsumerId;

    /// Topic this session is subscribed to.
    fn topic(&self) -> &str;

    /// Wait for the next message from the shared channel.
    async fn receive(&self, cancel: &CancellationToken) -> ConsumerResult<Message>;

    /// Acknowledge one message.
    fn ack_id(&self, id: &MessageId);

    /// Negatively acknowledge one message, scheduling redelivery.
    fn nack_id(&self, id: &MessageId);

    /// Remove the subscription on the broker.
    async fn unsubscribe(&self) -> ConsumerResult<()>;

    /// Close the session. Failures are handled internally.
    async fn close(&self);

    /// Publish `message` to the retry topic and acknowledge the original.
    async fn reconsume_later(
        &self,
        message: &Message,
        options: ReconsumeOptions,
    ) -> ConsumerResult<()>;

    /// Like `reconsume_later`, reporting the outcome through `callback`.
    fn reconsume_later_async(
        &self,
        message: Message,
        options: ReconsumeOptions,
        callback: ReconsumeCallback,
    );

    /// Reset the subscription to a message id.
    async fn seek(&self, id: &MessageId) -> ConsumerResult<()>;

    /// Reset the subscription to a publish time.
    async fn seek_by_time(&self, time: SystemTime) -> ConsumerResult<()>;
}

/// Outcome of subscribing to one topic.
pub struct SubscribeOutcome {
    /// Topic as requested.
    pub topic: String,
    /// The created session, or why it could not be created.
    pub result: ConsumerResult<Arc<dyn TopicConsumer>>,
}

impl SubscribeOutcome {
    pub fn ok(topic: impl Into<String>, consumer: Arc<dyn TopicConsumer>) -> Self {
        Self {
            topic: topic.into(),
            result: Ok(consumer),
        }
    }

    pub fn err(topic: impl Into<String>, error: crate::domain::error::ConsumerError) -> Self {
        Self {
            topic: topic.into(),
            result: Err(error),
        }
    }
}

/// Stream of subscription outcomes, one per requested topic.
pub type SubscribeOutcomes = Pin<Box<dyn Stream<Item = SubscribeOutcome> + Send>>;

/// Creates one [`TopicConsumer`] per topic.
pub trait Subscriber: Send + Sync {
    /// Start subscribing to every topic.
    ///
    /// Sessions may be created concurrently. The returned stream yields one
    /// outcome per topic and ends after all of them were attempted. Created
    /// sessions push into `channel`.
    fn subscribe(
        &self,
        topics: &[String],
        config: &ConsumerConfig,
        channel: &SharedChannel,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> SubscribeOutcomes;
}

/// Publishes to retry and dead-letter topics.
#[async_trait]
pub trait DeadLetterRouter: Send + Sync {
    /// Publish `message` to `topic`.
    async fn send(&self, topic: &str, message: ProducerMessage) -> ConsumerResult<MessageId>;

    /// Release producers. Called once, after every topic session closed.
    async fn close(&self);
}
