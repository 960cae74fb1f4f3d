//! Driving Ports (API - Inbound)

use crate::domain::channel::MessageChannel;
use crate::domain::error::ConsumerResult;
use crate::domain::types::{ReconsumeCallback, ReconsumeOptions};
use async_trait::async_trait;
use mq_types::{Message, MessageId};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Consumer API
///
/// What an application sees, whether it subscribed to one topic or many.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Subscription name
    fn subscription(&self) -> &str;

    /// Remove the subscription from every topic
    async fn unsubscribe(&self) -> ConsumerResult<()>;

    /// Wait for the next message
    ///
    /// # Returns
    /// * `Ok(message)` - next message from any topic
    /// * `Err(ConsumerClosed)` - the consumer is closed or no message will ever arrive
    /// * `Err(Cancelled)` - `cancel` fired first
    async fn receive(&self, cancel: &CancellationToken) -> ConsumerResult<Message>;

    /// Read side of the shared channel, for callers running their own event loop
    fn chan(&self) -> MessageChannel;

    /// Acknowledge a message
    fn ack(&self, message: &Message) {
        self.ack_id(&message.id)
    }

    /// Acknowledge a message by id
    fn ack_id(&self, id: &MessageId);

    /// Negatively acknowledge a message
    fn nack(&self, message: &Message) {
        self.nack_id(&message.id)
    }

    /// Negatively acknowledge a message by id
    fn nack_id(&self, id: &MessageId);

    /// Close the consumer; safe to call any number of times
    async fn close(&self);

    /// Reset the subscription to a message id
    async fn seek(&self, id: &MessageId) -> ConsumerResult<()>;

    /// Reset the subscription to a publish time
    async fn seek_by_time(&self, time: SystemTime) -> ConsumerResult<()>;

    /// Send a message to the retry topic for later redelivery
    async fn reconsume_later(&self, message: &Message, options: ReconsumeOptions)
        -> ConsumerResult<()>;

    /// Asynchronous `reconsume_later`; outcome reported through `callback`
    fn reconsume_later_async(
        &self,
        message: Message,
        options: ReconsumeOptions,
        callback: ReconsumeCallback,
    );
}
