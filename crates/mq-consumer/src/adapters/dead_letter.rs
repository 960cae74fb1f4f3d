use super::lifecycle::{LifecycleEvent, LifecycleLog};
use crate::domain::error::{ConsumerError, ConsumerResult};
use crate::ports::outbound::DeadLetterRouter;
use async_trait::async_trait;
use mq_types::{MessageId, ProducerMessage};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

/// In-memory implementation of DeadLetterRouter for testing
///
/// Keeps every published message in memory instead of producing to a broker.
#[derive(Default)]
pub struct InMemoryDeadLetterRouter {
    published: RwLock<Vec<(String, ProducerMessage)>>,
    next_entry: AtomicU64,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    send_failure: Option<String>,
    lifecycle: Option<LifecycleLog>,
}

impl InMemoryDeadLetterRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send with `reason`.
    #[must_use]
    pub fn with_send_failure(mut self, reason: impl Into<String>) -> Self {
        self.send_failure = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_lifecycle_log(mut self, log: LifecycleLog) -> Self {
        self.lifecycle = Some(log);
        self
    }

    /// Published `(topic, message)` pairs in order.
    pub fn published(&self) -> Vec<(String, ProducerMessage)> {
        self.published.read().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeadLetterRouter for InMemoryDeadLetterRouter {
    async fn send(&self, topic: &str, message: ProducerMessage) -> ConsumerResult<MessageId> {
        if self.is_closed() {
            return Err(ConsumerError::Publish {
                reason: "dead letter router closed".into(),
            });
        }
        if let Some(reason) = &self.send_failure {
            return Err(ConsumerError::Publish {
                reason: reason.clone(),
            });
        }

        let entry = self.next_entry.fetch_add(1, Ordering::SeqCst);
        self.published.write().push((topic.to_string(), message));
        debug!(topic = %topic, entry, "Published to letter topic");
        Ok(MessageId::new(0, entry, -1, -1))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if let Some(log) = &self.lifecycle {
            log.record(LifecycleEvent::RouterClosed);
        }
    }
}
