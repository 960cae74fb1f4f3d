//! In-memory topic sessions and subscriber.
//!
//! No broker involved: messages are injected with
//! [`InMemoryTopicConsumer::deliver`] and everything the aggregator asks a
//! session to do is recorded for inspection. Nacked messages come back after
//! the configured redelivery delay, or go to the dead letter topic once they
//! reach the policy's delivery limit.

use super::lifecycle::{LifecycleEvent, LifecycleLog};
use crate::domain::channel::{MessageChannel, SharedChannel};
use crate::domain::config::{ConsumerConfig, LetterTopics, SubscriptionType};
use crate::domain::error::{ConsumerError, ConsumerResult};
use crate::domain::types::{ReconsumeCallback, ReconsumeOptions};
use crate::ports::outbound::{
    DeadLetterRouter, SubscribeOutcome, SubscribeOutcomes, Subscriber, TopicConsumer,
};
use async_trait::async_trait;
use mq_types::{properties, ConsumerId, ConsumerMessage, Message, MessageId, ProducerMessage, TopicName};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static NEXT_LEDGER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct SessionRecord {
    acked: Vec<MessageId>,
    nacked: Vec<MessageId>,
    dead_lettered: Vec<MessageId>,
    reconsumed: Vec<ProducerMessage>,
    seek_calls: usize,
    unsubscribed: bool,
    close_calls: usize,
}

/// Delivered but not yet acknowledged, keyed by position.
type Pending = Arc<Mutex<HashMap<MessageId, Message>>>;

/// Pending key of `id`, with the origin stripped.
fn position(id: &MessageId) -> MessageId {
    MessageId::new(id.ledger_id, id.entry_id, id.batch_index, id.partition_index)
}

/// One topic session backed by the shared channel only.
pub struct InMemoryTopicConsumer {
    id: ConsumerId,
    topic: String,
    subscription: String,
    subscription_type: SubscriptionType,
    consumer_name: Option<String>,
    letters: LetterTopics,
    max_deliveries: Option<u32>,
    nack_delay: Duration,
    ledger_id: u64,
    partition_index: i32,
    next_entry: AtomicU64,
    sender: Mutex<Option<mpsc::Sender<ConsumerMessage>>>,
    messages: MessageChannel,
    pending: Pending,
    closed: CancellationToken,
    dlq: Arc<dyn DeadLetterRouter>,
    record: Arc<RwLock<SessionRecord>>,
    close_delay: Option<Duration>,
    unsubscribe_failure: Option<ConsumerError>,
    lifecycle: Option<LifecycleLog>,
}

impl InMemoryTopicConsumer {
    /// Session on `topic` for the subscription described by `config`, pushing
    /// into `channel`.
    ///
    /// Retried and dead-lettered messages are published to `letters` through `dlq`.
    pub fn new(
        topic: impl Into<String>,
        config: &ConsumerConfig,
        letters: LetterTopics,
        channel: &SharedChannel,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> Self {
        let topic = topic.into();
        let partition_index = TopicName::parse(&topic)
            .map(|name| name.partition)
            .unwrap_or(-1);

        Self {
            id: ConsumerId::new(),
            topic,
            subscription: config.subscription_name.clone(),
            subscription_type: config.subscription_type,
            consumer_name: config.consumer_name.clone(),
            letters,
            max_deliveries: config.max_deliveries(),
            nack_delay: config.nack_redelivery_delay,
            ledger_id: NEXT_LEDGER.fetch_add(1, Ordering::Relaxed),
            partition_index,
            next_entry: AtomicU64::new(0),
            sender: Mutex::new(Some(channel.sender())),
            messages: channel.receiver(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: CancellationToken::new(),
            dlq,
            record: Arc::new(RwLock::new(SessionRecord::default())),
            close_delay: None,
            unsubscribe_failure: None,
            lifecycle: None,
        }
    }

    /// Take `delay` to close.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// Fail `unsubscribe` with `error`.
    #[must_use]
    pub fn with_unsubscribe_failure(mut self, error: ConsumerError) -> Self {
        self.unsubscribe_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_lifecycle_log(mut self, log: LifecycleLog) -> Self {
        self.lifecycle = Some(log);
        self
    }

    /// Push a new message with `payload` into the shared channel.
    pub async fn deliver(&self, payload: impl Into<Vec<u8>>) -> ConsumerResult<MessageId> {
        let entry = self.next_entry.fetch_add(1, Ordering::SeqCst);
        let id = MessageId::new(self.ledger_id, entry, -1, self.partition_index);
        self.deliver_message(Message::new(id, self.topic.clone(), payload))
            .await
    }

    /// Push `message` as is, tagged with this session.
    ///
    /// Lets tests report a topic formatted differently from the subscribed one.
    pub async fn deliver_message(&self, message: Message) -> ConsumerResult<MessageId> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(ConsumerError::ConsumerClosed)?;

        let tagged = ConsumerMessage::new(self.id, message);
        let id = tagged.message.id.clone();
        self.pending
            .lock()
            .insert(position(&id), tagged.message.clone());
        if sender.send(tagged).await.is_err() {
            self.pending.lock().remove(&position(&id));
            return Err(ConsumerError::ConsumerClosed);
        }
        Ok(id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close_calls(&self) -> usize {
        self.record.read().close_calls
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.record.read().unsubscribed
    }

    pub fn acked(&self) -> Vec<MessageId> {
        self.record.read().acked.clone()
    }

    pub fn nacked(&self) -> Vec<MessageId> {
        self.record.read().nacked.clone()
    }

    /// Messages moved to the dead letter topic after too many deliveries.
    pub fn dead_lettered(&self) -> Vec<MessageId> {
        self.record.read().dead_lettered.clone()
    }

    /// Messages published to the retry topic by this session.
    pub fn reconsumed(&self) -> Vec<ProducerMessage> {
        self.record.read().reconsumed.clone()
    }

    pub fn seek_calls(&self) -> usize {
        self.record.read().seek_calls
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn subscription_type(&self) -> SubscriptionType {
        self.subscription_type
    }

    pub fn consumer_name(&self) -> Option<&str> {
        self.consumer_name.as_deref()
    }

    pub fn retry_topic(&self) -> &str {
        &self.letters.retry
    }

    pub fn dead_letter_topic(&self) -> &str {
        &self.letters.dead_letter
    }

    /// Send `message` back through the shared channel once the nack delay passes.
    fn redeliver_later(&self, runtime: &Handle, mut message: Message, deliveries: u32) {
        let Some(sender) = self.sender.lock().clone() else {
            return;
        };
        let origin = self.id;
        let delay = self.nack_delay;
        let closed = self.closed.clone();
        let pending = Arc::clone(&self.pending);
        let topic = self.topic.clone();

        runtime.spawn(async move {
            tokio::select! {
                _ = closed.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            message.redelivery_count = deliveries;
            let key = position(&message.id);
            pending.lock().insert(key.clone(), message.clone());
            if sender.send(ConsumerMessage::new(origin, message)).await.is_err() {
                pending.lock().remove(&key);
                debug!(topic = %topic, message_id = %key, "Redelivery dropped, channel closed");
            }
        });
    }

    /// Move `message` to the dead letter topic, acknowledging it once published.
    fn dead_letter(&self, runtime: &Handle, message: Message) {
        let dlq = Arc::clone(&self.dlq);
        let record = Arc::clone(&self.record);
        let dead_letter_topic = self.letters.dead_letter.clone();

        runtime.spawn(async move {
            let produced = ProducerMessage::from_message(&message);
            match dlq.send(&dead_letter_topic, produced).await {
                Ok(_) => {
                    let mut record = record.write();
                    record.acked.push(message.id.clone());
                    record.dead_lettered.push(message.id);
                }
                Err(error) => warn!(
                    topic = %dead_letter_topic,
                    message_id = %message.id,
                    error = %error,
                    "Unable to send message to dead letter topic"
                ),
            }
        });
    }
}

async fn publish_retry(
    dlq: &dyn DeadLetterRouter,
    retry_topic: &str,
    message: &Message,
    options: &ReconsumeOptions,
) -> (ConsumerResult<MessageId>, ProducerMessage) {
    let mut produced = ProducerMessage::for_reconsume(message, options.delay);
    if let Some(level) = options.delay_level {
        produced
            .properties
            .insert(properties::DELAY_LEVEL.to_string(), level.to_string());
    }
    let result = dlq.send(retry_topic, produced.clone()).await;
    (result, produced)
}

#[async_trait]
impl TopicConsumer for InMemoryTopicConsumer {
    fn id(&self) -> ConsumerId {
        self.id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn receive(&self, cancel: &CancellationToken) -> ConsumerResult<Message> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ConsumerError::ConsumerClosed),
            _ = cancel.cancelled() => Err(ConsumerError::Cancelled),
            next = self.messages.recv() => next
                .map(|delivered| delivered.message)
                .ok_or(ConsumerError::ConsumerClosed),
        }
    }

    fn ack_id(&self, id: &MessageId) {
        if self.is_closed() {
            debug!(topic = %self.topic, message_id = %id, "Ack ignored, consumer closed");
            return;
        }
        self.pending.lock().remove(&position(id));
        self.record.write().acked.push(id.clone());
    }

    fn nack_id(&self, id: &MessageId) {
        if self.is_closed() {
            debug!(topic = %self.topic, message_id = %id, "Nack ignored, consumer closed");
            return;
        }
        self.record.write().nacked.push(id.clone());

        let Some(message) = self.pending.lock().remove(&position(id)) else {
            debug!(topic = %self.topic, message_id = %id, "Nacked message not pending, nothing to redeliver");
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(topic = %self.topic, message_id = %id, "No runtime to redeliver on, nack dropped");
            return;
        };

        let deliveries = message.redelivery_count + 1;
        if self.max_deliveries.is_some_and(|max| deliveries >= max) {
            debug!(
                topic = %self.topic,
                consumer_name = self.consumer_name.as_deref().unwrap_or_default(),
                message_id = %id,
                deliveries,
                "Delivery limit reached, moving message to dead letter topic"
            );
            self.dead_letter(&runtime, message);
        } else {
            self.redeliver_later(&runtime, message, deliveries);
        }
    }

    async fn unsubscribe(&self) -> ConsumerResult<()> {
        if let Some(error) = &self.unsubscribe_failure {
            return Err(error.clone());
        }
        self.record.write().unsubscribed = true;
        Ok(())
    }

    async fn close(&self) {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }

        self.sender.lock().take();
        self.closed.cancel();
        self.pending.lock().clear();
        self.record.write().close_calls += 1;
        if let Some(log) = &self.lifecycle {
            log.record(LifecycleEvent::TopicClosed(self.topic.clone()));
        }
        debug!(
            topic = %self.topic,
            subscription = %self.subscription,
            consumer_name = self.consumer_name.as_deref().unwrap_or_default(),
            consumer_id = %self.id,
            "Topic consumer closed"
        );
    }

    async fn reconsume_later(
        &self,
        message: &Message,
        options: ReconsumeOptions,
    ) -> ConsumerResult<()> {
        if self.is_closed() {
            return Err(ConsumerError::ConsumerClosed);
        }

        let (result, produced) =
            publish_retry(self.dlq.as_ref(), &self.letters.retry, message, &options).await;
        result?;

        self.pending.lock().remove(&position(&message.id));
        let mut record = self.record.write();
        record.acked.push(message.id.clone());
        record.reconsumed.push(produced);
        Ok(())
    }

    fn reconsume_later_async(
        &self,
        message: Message,
        options: ReconsumeOptions,
        callback: ReconsumeCallback,
    ) {
        if self.is_closed() {
            let produced = ProducerMessage::for_reconsume(&message, options.delay);
            callback(Err(ConsumerError::ConsumerClosed), produced);
            return;
        }

        let dlq = Arc::clone(&self.dlq);
        let retry_topic = self.letters.retry.clone();
        let record = Arc::clone(&self.record);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let (result, produced) =
                publish_retry(dlq.as_ref(), &retry_topic, &message, &options).await;
            if result.is_ok() {
                pending.lock().remove(&position(&message.id));
                let mut record = record.write();
                record.acked.push(message.id.clone());
                record.reconsumed.push(produced.clone());
            }
            callback(result, produced);
        });
    }

    async fn seek(&self, _id: &MessageId) -> ConsumerResult<()> {
        self.record.write().seek_calls += 1;
        Ok(())
    }

    async fn seek_by_time(&self, _time: SystemTime) -> ConsumerResult<()> {
        self.record.write().seek_calls += 1;
        Ok(())
    }
}

/// Subscriber creating [`InMemoryTopicConsumer`]s, one task per topic.
///
/// Exclusive subscriptions admit one live session per topic across every
/// consumer built from the same subscriber.
#[derive(Default)]
pub struct InMemorySubscriber {
    failures: HashMap<String, ConsumerError>,
    unsubscribe_failures: HashMap<String, ConsumerError>,
    close_delay: Option<Duration>,
    lifecycle: Option<LifecycleLog>,
    created: Arc<RwLock<Vec<Arc<InMemoryTopicConsumer>>>>,
}

impl InMemorySubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the subscription to `topic` with `error`.
    #[must_use]
    pub fn with_failure(mut self, topic: impl Into<String>, error: ConsumerError) -> Self {
        self.failures.insert(topic.into(), error);
        self
    }

    /// Sessions on `topic` fail `unsubscribe` with `error`.
    #[must_use]
    pub fn with_unsubscribe_failure(mut self, topic: impl Into<String>, error: ConsumerError) -> Self {
        self.unsubscribe_failures.insert(topic.into(), error);
        self
    }

    /// Every created session takes `delay` to close.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_lifecycle_log(mut self, log: LifecycleLog) -> Self {
        self.lifecycle = Some(log);
        self
    }

    /// Every session created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<InMemoryTopicConsumer>> {
        self.created.read().clone()
    }

    /// Most recently created session on `topic`.
    pub fn consumer(&self, topic: &str) -> Option<Arc<InMemoryTopicConsumer>> {
        self.created
            .read()
            .iter()
            .rev()
            .find(|c| c.topic() == topic)
            .cloned()
    }

    fn exclusive_holder(&self, topic: &str, config: &ConsumerConfig) -> bool {
        config.subscription_type == SubscriptionType::Exclusive
            && self.created.read().iter().any(|c| {
                c.topic() == topic && c.subscription() == config.subscription_name && !c.is_closed()
            })
    }

    fn build_session(
        &self,
        topic: &str,
        config: &ConsumerConfig,
        letters: &ConsumerResult<LetterTopics>,
        channel: &SharedChannel,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> ConsumerResult<InMemoryTopicConsumer> {
        if let Some(error) = self.failures.get(topic) {
            return Err(error.clone());
        }
        TopicName::parse(topic)?;
        if self.exclusive_holder(topic, config) {
            return Err(ConsumerError::Connection {
                reason: format!(
                    "exclusive subscription {} already has a consumer on {}",
                    config.subscription_name, topic
                ),
            });
        }

        // A malformed first topic fails on its own; the rest fall back to their own namespace.
        let letters = match letters {
            Ok(letters) => letters.clone(),
            Err(_) => config.letter_topics(std::slice::from_ref(&topic.to_string()))?,
        };

        let mut session = InMemoryTopicConsumer::new(topic, config, letters, channel, dlq);
        if let Some(error) = self.unsubscribe_failures.get(topic) {
            session = session.with_unsubscribe_failure(error.clone());
        }
        if let Some(delay) = self.close_delay {
            session = session.with_close_delay(delay);
        }
        if let Some(log) = &self.lifecycle {
            session = session.with_lifecycle_log(log.clone());
        }
        Ok(session)
    }
}

impl Subscriber for InMemorySubscriber {
    fn subscribe(
        &self,
        topics: &[String],
        config: &ConsumerConfig,
        channel: &SharedChannel,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> SubscribeOutcomes {
        let (tx, rx) = mpsc::channel(topics.len().max(1));
        let letters = config.letter_topics(topics);

        for topic in topics {
            let session = self.build_session(topic, config, &letters, channel, Arc::clone(&dlq));
            let created = Arc::clone(&self.created);
            let tx = tx.clone();
            let topic = topic.clone();

            tokio::spawn(async move {
                let outcome = match session {
                    Ok(session) => {
                        let session = Arc::new(session);
                        created.write().push(Arc::clone(&session));
                        SubscribeOutcome::ok(topic, session)
                    }
                    Err(error) => SubscribeOutcome::err(topic, error),
                };
                if tx.send(outcome).await.is_err() {
                    warn!("Subscription outcome dropped, receiver gone");
                }
            });
        }

        Box::pin(ReceiverStream::new(rx))
    }
}
