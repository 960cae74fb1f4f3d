//! Reconsume options and callbacks

use crate::domain::error::ConsumerResult;
use mq_types::{MessageId, ProducerMessage};
use std::time::Duration;

/// How a message sent back for reconsumption should be redelivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconsumeOptions {
    /// Redeliver after this delay.
    pub delay: Option<Duration>,
    /// Broker-side delay level, for platforms that use fixed level tables.
    pub delay_level: Option<u32>,
}

impl ReconsumeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_delay_level(mut self, level: u32) -> Self {
        self.delay_level = Some(level);
        self
    }
}

/// Completion callback of an asynchronous reconsume.
///
/// Receives the message that was published to the retry topic and either
/// its new id or the publication error.
pub type ReconsumeCallback = Box<dyn FnOnce(ConsumerResult<MessageId>, ProducerMessage) + Send>;
