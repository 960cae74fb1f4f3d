//! # Multi-Topic Consumer
//!
//! Presents N per-topic sessions as one logical consumer.
//!
//! ```text
//!                      ┌───────────────────────────────────────┐
//!  TopicConsumer(a) ──►│                                       │
//!  TopicConsumer(b) ──►│ shared channel ──► receive() / chan() │──► application
//!  TopicConsumer(c) ──►│                                       │
//!                      └───────────────────────────────────────┘
//!        ▲                                   │
//!        └──── ack / nack (by id origin) ────┘
//!        └──── reconsume (by topic short name)
//! ```
//!
//! The topic → session map is built once during construction and never
//! mutated, so routing reads it without locks. Close runs exactly once, as
//! its own task: every session is closed concurrently, then the closed
//! signal fires, then the dead-letter router is closed.

use crate::domain::channel::{MessageChannel, SharedChannel};
use crate::domain::config::ConsumerConfig;
use crate::domain::error::{ConsumerError, ConsumerResult};
use crate::ports::inbound::Consumer;
use crate::ports::outbound::{DeadLetterRouter, SubscribeOutcome, Subscriber, TopicConsumer};
use crate::domain::types::{ReconsumeCallback, ReconsumeOptions};
use async_trait::async_trait;
use futures::future::join_all;
use mq_types::{ConsumerId, Message, MessageId, TopicName};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One subscription over many topics, merged into one message stream.
pub struct MultiTopicConsumer {
    config: ConsumerConfig,
    /// Owned topics in subscription order.
    topics: Vec<String>,
    consumers: HashMap<String, Arc<dyn TopicConsumer>>,
    /// Back-reference index: session id → topic key.
    origins: HashMap<ConsumerId, String>,
    messages: MessageChannel,
    closed: CancellationToken,
    /// Fires once the shutdown task has finished.
    shutdown: OnceLock<CancellationToken>,
    dlq: Arc<dyn DeadLetterRouter>,
}

impl MultiTopicConsumer {
    /// Subscribe to `topics`, allocating the shared channel from the config.
    ///
    /// Duplicated topics are subscribed once; with retry enabled the retry
    /// letter topic is added.
    pub async fn subscribe(
        config: ConsumerConfig,
        topics: &[String],
        subscriber: &dyn Subscriber,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> ConsumerResult<Self> {
        config.validate()?;
        let topics = config.effective_topics(topics)?;
        let channel = SharedChannel::new(config.receiver_queue_size);
        Self::new(config, topics, channel, subscriber, dlq).await
    }

    /// Build the consumer over a pre-allocated shared channel.
    ///
    /// Drains every subscription outcome. If any topic fails, every session
    /// that was created is closed and all failures are returned together.
    pub async fn new(
        config: ConsumerConfig,
        topics: Vec<String>,
        channel: SharedChannel,
        subscriber: &dyn Subscriber,
        dlq: Arc<dyn DeadLetterRouter>,
    ) -> ConsumerResult<Self> {
        config.validate()?;

        let mut seen = HashSet::new();
        let topics: Vec<String> = topics
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if topics.is_empty() {
            return Err(ConsumerError::InvalidConfig {
                reason: "topic name is required".into(),
            });
        }

        let mut outcomes = subscriber.subscribe(&topics, &config, &channel, Arc::clone(&dlq));
        // Only sessions hold senders from here on.
        let messages = channel.into_receiver();

        let mut consumers: HashMap<String, Arc<dyn TopicConsumer>> =
            HashMap::with_capacity(topics.len());
        let mut failures: Vec<ConsumerError> = Vec::new();
        let mut failed_topics: HashSet<String> = HashSet::new();
        let mut strays: Vec<(String, Arc<dyn TopicConsumer>)> = Vec::new();

        while let Some(SubscribeOutcome { topic, result }) = outcomes.next().await {
            match result {
                Ok(consumer) if !seen.contains(&topic) || consumers.contains_key(&topic) => {
                    warn!(
                        subscription = %config.subscription_name,
                        topic = %topic,
                        "Unexpected subscription outcome, closing extra topic consumer"
                    );
                    strays.push((topic, consumer));
                }
                Ok(consumer) => {
                    debug!(
                        subscription = %config.subscription_name,
                        topic = %topic,
                        consumer_id = %consumer.id(),
                        "Topic consumer registered"
                    );
                    consumers.insert(topic, consumer);
                }
                Err(source) => {
                    error!(
                        subscription = %config.subscription_name,
                        topic = %topic,
                        error = %source,
                        "Unable to subscribe to topic"
                    );
                    failed_topics.insert(topic.clone());
                    failures.push(ConsumerError::Subscribe {
                        topic,
                        source: Box::new(source),
                    });
                }
            }
        }

        for topic in &topics {
            if !consumers.contains_key(topic) && !failed_topics.contains(topic) {
                failures.push(ConsumerError::Subscribe {
                    topic: topic.clone(),
                    source: Box::new(ConsumerError::Connection {
                        reason: "subscriber yielded no outcome".into(),
                    }),
                });
            }
        }

        if !strays.is_empty() {
            close_all(strays).await;
        }

        if let Some(error) = ConsumerError::aggregate(failures) {
            let created: Vec<_> = consumers.into_iter().collect();
            warn!(
                subscription = %config.subscription_name,
                created = created.len(),
                "Subscription failed, closing created topic consumers"
            );
            close_all(created).await;
            return Err(error);
        }

        let origins = consumers
            .iter()
            .map(|(topic, consumer)| (consumer.id(), topic.clone()))
            .collect();

        info!(
            subscription = %config.subscription_name,
            topics = topics.len(),
            "Multi-topic consumer created"
        );

        Ok(Self {
            config,
            topics,
            consumers,
            origins,
            messages,
            closed: CancellationToken::new(),
            shutdown: OnceLock::new(),
            dlq,
        })
    }

    /// Owned topics in subscription order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Configuration the consumer was built with.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Whether the closed signal has fired.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// `receive` bounded by a timeout.
    pub async fn receive_timeout(&self, timeout: Duration) -> ConsumerResult<Message> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.receive(&cancel)).await {
            Ok(result) => result,
            Err(_) => Err(ConsumerError::Timeout(timeout)),
        }
    }

    /// Session that delivered the message with this id.
    fn route(&self, id: &MessageId, operation: &'static str) -> Option<&Arc<dyn TopicConsumer>> {
        let Some(origin) = id.origin() else {
            warn!(
                subscription = %self.config.subscription_name,
                message_id = %id,
                operation,
                "Unable to route message id, can not determine topic"
            );
            return None;
        };

        let consumer = self
            .origins
            .get(&origin)
            .and_then(|topic| self.consumers.get(topic));
        if consumer.is_none() {
            warn!(
                subscription = %self.config.subscription_name,
                message_id = %id,
                consumer_id = %origin,
                operation,
                "Invalid message id, not delivered by this consumer"
            );
        }
        consumer
    }

    /// Session whose topic is the same topic as `topic`.
    ///
    /// Exact key first, then the same partitioned topic, then the same
    /// short name. Ties resolve in subscription order.
    fn retry_target(&self, topic: &str) -> ConsumerResult<&Arc<dyn TopicConsumer>> {
        if let Some(consumer) = self.consumers.get(topic) {
            return Ok(consumer);
        }

        let wanted = TopicName::parse(topic)?;
        let owned: Vec<(&String, TopicName)> = self
            .topics
            .iter()
            .filter_map(|key| match TopicName::parse(key) {
                Ok(name) => Some((key, name)),
                Err(e) => {
                    debug!(topic = %key, error = %e, "Owned topic name does not parse");
                    None
                }
            })
            .collect();

        let wanted_partitioned = wanted.partitioned_topic_name();
        owned
            .iter()
            .find(|(_, name)| name.partitioned_topic_name() == wanted_partitioned)
            .or_else(|| owned.iter().find(|(_, name)| name.same_short_name(&wanted)))
            .and_then(|(key, _)| self.consumers.get(*key))
            .ok_or_else(|| ConsumerError::TopicNotFound {
                topic: topic.to_string(),
            })
    }

    /// Spawn the shutdown sequence, returning its completion signal.
    fn start_shutdown(&self) -> CancellationToken {
        let finished = CancellationToken::new();
        let done = finished.clone().drop_guard();
        let sessions = self.owned_sessions();
        let closed = self.closed.clone();
        let dlq = Arc::clone(&self.dlq);
        let subscription = self.config.subscription_name.clone();

        tokio::spawn(async move {
            let _done = done;
            let count = sessions.len();
            close_all(sessions).await;
            debug!(subscription = %subscription, closed = count, "All topic consumers closed");

            closed.cancel();
            dlq.close().await;

            info!(subscription = %subscription, "Multi-topic consumer closed");
        });

        finished
    }

    fn owned_sessions(&self) -> Vec<(String, Arc<dyn TopicConsumer>)> {
        self.topics
            .iter()
            .filter_map(|topic| {
                self.consumers
                    .get(topic)
                    .map(|consumer| (topic.clone(), Arc::clone(consumer)))
            })
            .collect()
    }
}

#[async_trait]
impl Consumer for MultiTopicConsumer {
    fn subscription(&self) -> &str {
        &self.config.subscription_name
    }

    /// Unsubscribes topic by topic, continuing past failures.
    ///
    /// Topics that succeeded stay unsubscribed when a later one fails, and
    /// the owned session map is left as is.
    async fn unsubscribe(&self) -> ConsumerResult<()> {
        let mut failures = Vec::new();
        for (topic, consumer) in self.owned_sessions() {
            if let Err(source) = consumer.unsubscribe().await {
                warn!(
                    subscription = %self.config.subscription_name,
                    topic = %topic,
                    error = %source,
                    "Unable to unsubscribe from topic"
                );
                failures.push(ConsumerError::Unsubscribe {
                    topic,
                    subscription: self.config.subscription_name.clone(),
                    source: Box::new(source),
                });
            }
        }

        match ConsumerError::aggregate(failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn receive(&self, cancel: &CancellationToken) -> ConsumerResult<Message> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ConsumerError::ConsumerClosed),
            _ = cancel.cancelled() => Err(ConsumerError::Cancelled),
            next = self.messages.recv() => match next {
                Some(delivered) => Ok(delivered.message),
                None => Err(ConsumerError::ConsumerClosed),
            },
        }
    }

    fn chan(&self) -> MessageChannel {
        self.messages.clone()
    }

    fn ack_id(&self, id: &MessageId) {
        if let Some(consumer) = self.route(id, "ack") {
            consumer.ack_id(id);
        }
    }

    fn nack_id(&self, id: &MessageId) {
        if let Some(consumer) = self.route(id, "nack") {
            consumer.nack_id(id);
        }
    }

    /// Session close failures are absorbed by the sessions themselves.
    ///
    /// The first call starts the shutdown task; every call waits for it.
    /// Dropping a caller's future leaves the shutdown running.
    async fn close(&self) {
        let finished = self.shutdown.get_or_init(|| self.start_shutdown()).clone();
        finished.cancelled().await;
    }

    async fn seek(&self, _id: &MessageId) -> ConsumerResult<()> {
        Err(ConsumerError::SeekNotAllowed)
    }

    async fn seek_by_time(&self, _time: SystemTime) -> ConsumerResult<()> {
        Err(ConsumerError::SeekNotAllowed)
    }

    async fn reconsume_later(
        &self,
        message: &Message,
        options: ReconsumeOptions,
    ) -> ConsumerResult<()> {
        if !self.config.enable_retry {
            return Err(ConsumerError::RetryDisabled);
        }
        let consumer = self.retry_target(&message.topic)?;
        consumer.reconsume_later(message, options).await
    }

    /// Failures are logged; `callback` only runs once a session accepted the message.
    fn reconsume_later_async(
        &self,
        message: Message,
        options: ReconsumeOptions,
        callback: ReconsumeCallback,
    ) {
        if !self.config.enable_retry {
            warn!(
                subscription = %self.config.subscription_name,
                topic = %message.topic,
                "Reconsume skipped, this consumer config retry disabled"
            );
            return;
        }

        match self.retry_target(&message.topic) {
            Ok(consumer) => consumer.reconsume_later_async(message, options, callback),
            Err(error) => warn!(
                subscription = %self.config.subscription_name,
                topic = %message.topic,
                error = %error,
                "Reconsume skipped"
            ),
        }
    }
}

/// Close every session as its own task and wait for all of them.
async fn close_all(sessions: Vec<(String, Arc<dyn TopicConsumer>)>) {
    let (topics, handles): (Vec<_>, Vec<_>) = sessions
        .into_iter()
        .map(|(topic, consumer)| (topic, tokio::spawn(async move { consumer.close().await })))
        .unzip();

    for (topic, joined) in topics.iter().zip(join_all(handles).await) {
        if let Err(e) = joined {
            warn!(topic = %topic, error = %e, "Topic consumer close task failed");
        }
    }
}
