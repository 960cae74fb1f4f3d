//! # Message Flows
//!
//! Receive, acknowledgement routing and retry routing through a
//! `MultiTopicConsumer` built on in-memory topic sessions.

#[cfg(test)]
mod tests {
    use super::super::{subscribe, topics};
    use futures::StreamExt;
    use mq_consumer::{
        Consumer, ConsumerConfig, ConsumerError, InMemorySubscriber, ReconsumeOptions,
    };
    use mq_types::{properties, Message, MessageId};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // SCENARIO: TWO TOPICS, RETRY DISABLED
    // =============================================================================

    #[tokio::test]
    async fn test_two_topic_scenario() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) = subscribe(ConsumerConfig::new("sub1"), &["a", "b"], &subscriber).await;
        let consumer = consumer.unwrap();

        subscriber.consumer("a").unwrap().deliver(b"from-a".to_vec()).await.unwrap();
        subscriber.consumer("b").unwrap().deliver(b"from-b".to_vec()).await.unwrap();

        let cancel = CancellationToken::new();
        let mut payloads = HashSet::new();
        for _ in 0..2 {
            let message = timeout(Duration::from_secs(1), consumer.receive(&cancel))
                .await
                .expect("receive timed out")
                .unwrap();
            payloads.insert(message.payload);
        }
        assert_eq!(
            payloads,
            HashSet::from([b"from-a".to_vec(), b"from-b".to_vec()])
        );

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert_eq!(consumer.receive(&cancelled).await, Err(ConsumerError::Cancelled));

        let message = Message::new(MessageId::new(1, 1, -1, -1), "a", "x");
        let err = consumer
            .reconsume_later(&message, ReconsumeOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "this consumer config retry disabled");

        consumer.close().await;
        assert_eq!(consumer.receive(&cancel).await, Err(ConsumerError::ConsumerClosed));
    }

    // =============================================================================
    // FAN-IN
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_pushed_message_is_observed_once() {
        let names = ["t0", "t1", "t2", "t3", "t4"];
        let per_topic = 40;
        let subscriber = InMemorySubscriber::new();
        let config = ConsumerConfig::new("fan-in").with_receiver_queue_size(8);
        let (consumer, _) = subscribe(config, &names, &subscriber).await;
        let consumer = consumer.unwrap();

        let producers: Vec<_> = names
            .iter()
            .map(|name| {
                let session = subscriber.consumer(name).unwrap();
                tokio::spawn(async move {
                    for i in 0..per_topic {
                        session.deliver(vec![i as u8]).await.unwrap();
                    }
                })
            })
            .collect();

        let expected = names.len() * per_topic;
        let received: Vec<_> = timeout(
            Duration::from_secs(5),
            consumer.chan().into_stream().take(expected).collect::<Vec<_>>(),
        )
        .await
        .expect("stream stalled");

        for producer in futures::future::join_all(producers).await {
            producer.unwrap();
        }

        let unique: HashSet<_> = received
            .iter()
            .map(|m| (m.message.topic.clone(), m.message.id.entry_id))
            .collect();
        assert_eq!(unique.len(), expected);
        assert!(consumer.chan().try_recv().is_none());
    }

    // =============================================================================
    // ACK ROUTING
    // =============================================================================

    #[tokio::test]
    async fn test_ack_and_nack_reach_origin_session_only() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) =
            subscribe(ConsumerConfig::new("sub1"), &["a", "b", "c"], &subscriber).await;
        let consumer = consumer.unwrap();

        for name in ["a", "b", "c"] {
            subscriber.consumer(name).unwrap().deliver(name.as_bytes().to_vec()).await.unwrap();
        }

        let cancel = CancellationToken::new();
        for _ in 0..3 {
            let message = consumer.receive(&cancel).await.unwrap();
            if message.payload == b"b" {
                consumer.nack(&message);
            } else {
                consumer.ack(&message);
            }
        }

        let a = subscriber.consumer("a").unwrap();
        let b = subscriber.consumer("b").unwrap();
        let c = subscriber.consumer("c").unwrap();
        assert_eq!(a.acked().len(), 1);
        assert_eq!(c.acked().len(), 1);
        assert!(b.acked().is_empty());
        assert_eq!(b.nacked().len(), 1);
        assert!(a.acked()[0].origin() == Some(mq_consumer::TopicConsumer::id(a.as_ref())));
    }

    // =============================================================================
    // RETRY ROUTING
    // =============================================================================

    #[tokio::test]
    async fn test_reconsume_through_retry_topic() {
        let subscriber = InMemorySubscriber::new();
        let config = ConsumerConfig::new("sub1").with_retry(true);
        let (consumer, dlq) =
            subscribe(config, &["persistent://t/ns/foo"], &subscriber).await;
        let consumer = consumer.unwrap();
        assert_eq!(
            consumer.topics(),
            &topics(&["persistent://t/ns/foo", "persistent://t/ns/sub1-RETRY"])
        );

        let session = subscriber.consumer("persistent://t/ns/foo").unwrap();
        session
            .deliver_message(Message::new(MessageId::new(9, 1, -1, -1), "foo", "payload"))
            .await
            .unwrap();
        let message = consumer.receive(&CancellationToken::new()).await.unwrap();

        consumer
            .reconsume_later(&message, ReconsumeOptions::new().with_delay(Duration::from_millis(250)))
            .await
            .unwrap();

        let (topic, produced) = dlq.published().remove(0);
        assert_eq!(topic, "persistent://t/ns/sub1-RETRY");
        assert_eq!(produced.properties[properties::RECONSUME_TIMES], "1");
        assert_eq!(produced.properties[properties::REAL_TOPIC], "foo");
        assert_eq!(produced.deliver_after, Some(Duration::from_millis(250)));

        let stranger = Message::new(MessageId::new(9, 2, -1, -1), "bar", "payload");
        let err = consumer
            .reconsume_later(&stranger, ReconsumeOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "topic bar not in multi topic consumer list");
    }

    #[tokio::test]
    async fn test_reconsume_async_reports_publish_failure() {
        let subscriber = InMemorySubscriber::new();
        let config = ConsumerConfig::new("sub1").with_retry(true);
        let (consumer, dlq) = subscribe(config, &["persistent://t/ns/foo"], &subscriber).await;
        let consumer = consumer.unwrap();

        // Closing the router makes every later publication fail.
        mq_consumer::DeadLetterRouter::close(dlq.as_ref()).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        consumer.reconsume_later_async(
            Message::new(MessageId::new(1, 1, -1, -1), "foo", "x"),
            ReconsumeOptions::new(),
            Box::new(move |result, _| {
                let _ = tx.send(result);
            }),
        );

        let result = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
        assert!(matches!(result, Err(ConsumerError::Publish { .. })));
        assert!(subscriber
            .consumer("persistent://t/ns/foo")
            .unwrap()
            .acked()
            .is_empty());
    }
}
