//! # Consumer Lifecycle
//!
//! Construction atomicity, unsubscribe, seek rejection and shutdown.

#[cfg(test)]
mod tests {
    use super::super::{init_test_logging, subscribe, topics};
    use futures::future::join_all;
    use mq_consumer::{
        Consumer, ConsumerConfig, ConsumerError, DeadLetterRouter, InMemoryDeadLetterRouter,
        InMemorySubscriber, LifecycleEvent, LifecycleLog, MultiTopicConsumer, SharedChannel,
    };
    use mq_telemetry::{init_logging, TelemetryConfig, TelemetryError};
    use mq_types::MessageId;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tokio::time::{timeout, Instant};
    use tokio_util::sync::CancellationToken;

    fn refused() -> ConsumerError {
        ConsumerError::Connection {
            reason: "connection refused".into(),
        }
    }

    // =============================================================================
    // CONSTRUCTION
    // =============================================================================

    #[tokio::test]
    async fn test_partial_subscription_leaves_nothing_open() {
        let subscriber = InMemorySubscriber::new().with_failure("d", refused());
        let (consumer, dlq) =
            subscribe(ConsumerConfig::new("sub1"), &["a", "b", "c", "d"], &subscriber).await;

        let err = consumer.err().unwrap();
        assert_eq!(
            err.to_string(),
            "unable to subscribe to topic=d: connection error: connection refused"
        );
        let created = subscriber.created();
        assert_eq!(created.len(), 3);
        assert!(created.iter().all(|session| session.close_calls() == 1));
        assert_eq!(dlq.close_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_topic_fails_construction() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) =
            subscribe(ConsumerConfig::new("sub1"), &["a", "x/y"], &subscriber).await;

        let err = consumer.err().unwrap();
        assert!(matches!(
            &err,
            ConsumerError::Subscribe { topic, source }
                if topic == "x/y" && matches!(**source, ConsumerError::InvalidTopicName(_))
        ));
        assert!(subscriber.created().iter().all(|s| s.is_closed()));
    }

    #[tokio::test]
    async fn test_empty_topic_list_rejected() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) = subscribe(ConsumerConfig::new("sub1"), &[], &subscriber).await;

        assert!(matches!(consumer, Err(ConsumerError::InvalidConfig { .. })));
        assert!(subscriber.created().is_empty());
    }

    // =============================================================================
    // UNSUBSCRIBE / SEEK
    // =============================================================================

    #[tokio::test]
    async fn test_unsubscribe_reports_every_failed_topic() {
        let subscriber = InMemorySubscriber::new()
            .with_unsubscribe_failure("a", refused())
            .with_unsubscribe_failure("c", refused());
        let (consumer, _) =
            subscribe(ConsumerConfig::new("sub1"), &["a", "b", "c"], &subscriber).await;
        let consumer = consumer.unwrap();

        let err = consumer.unsubscribe().await.unwrap_err();
        assert_eq!(err.failures().len(), 2);
        assert!(err.to_string().contains(
            "unable to unsubscribe from topic=a subscription=sub1: connection error: connection refused"
        ));
        assert!(subscriber.consumer("b").unwrap().is_unsubscribed());
    }

    #[tokio::test]
    async fn test_seek_not_allowed() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) = subscribe(ConsumerConfig::new("sub1"), &["a", "b"], &subscriber).await;
        let consumer = consumer.unwrap();

        let err = consumer.seek(&MessageId::latest()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "seek command not allowed for multi topic consumer"
        );
        assert_eq!(
            consumer.seek_by_time(SystemTime::UNIX_EPOCH).await,
            Err(ConsumerError::SeekNotAllowed)
        );
    }

    // =============================================================================
    // CLOSE
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_runs_once() {
        init_test_logging();
        let log = LifecycleLog::new();
        let subscriber = InMemorySubscriber::new()
            .with_close_delay(Duration::from_millis(20))
            .with_lifecycle_log(log.clone());
        let dlq = Arc::new(InMemoryDeadLetterRouter::new().with_lifecycle_log(log.clone()));
        let consumer = Arc::new(
            MultiTopicConsumer::new(
                ConsumerConfig::new("sub1"),
                topics(&["a", "b", "c"]),
                SharedChannel::new(16),
                &subscriber,
                Arc::clone(&dlq) as Arc<dyn DeadLetterRouter>,
            )
            .await
            .unwrap(),
        );

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                tokio::spawn(async move { consumer.close().await })
            })
            .collect();
        for closed in join_all(closers).await {
            closed.unwrap();
        }

        // Every caller returned after the whole shutdown finished.
        let events = log.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3], LifecycleEvent::RouterClosed);
        assert_eq!(dlq.close_calls(), 1);
        assert!(subscriber.created().iter().all(|s| s.close_calls() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_close_concurrently() {
        let subscriber = InMemorySubscriber::new().with_close_delay(Duration::from_millis(100));
        let (consumer, _) =
            subscribe(ConsumerConfig::new("sub1"), &["a", "b", "c", "d"], &subscriber).await;
        let consumer = consumer.unwrap();

        let started = Instant::now();
        consumer.close().await;

        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(consumer.is_closed());
    }

    #[tokio::test]
    async fn test_close_wakes_every_blocked_receiver() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) = subscribe(ConsumerConfig::new("sub1"), &["a"], &subscriber).await;
        let consumer = Arc::new(consumer.unwrap());

        let waiting: Vec<_> = (0..3)
            .map(|_| {
                let consumer = Arc::clone(&consumer);
                tokio::spawn(async move { consumer.receive(&CancellationToken::new()).await })
            })
            .collect();
        tokio::task::yield_now().await;

        consumer.close().await;

        let results = timeout(Duration::from_secs(1), join_all(waiting))
            .await
            .expect("receivers still blocked");
        for result in results {
            assert_eq!(result.unwrap(), Err(ConsumerError::ConsumerClosed));
        }
    }

    #[tokio::test]
    async fn test_acks_after_close_do_not_panic() {
        let subscriber = InMemorySubscriber::new();
        let (consumer, _) = subscribe(ConsumerConfig::new("sub1"), &["a"], &subscriber).await;
        let consumer = consumer.unwrap();

        let id = subscriber.consumer("a").unwrap().deliver(b"x".to_vec()).await.unwrap();
        consumer.close().await;

        consumer.ack_id(&id);
        consumer.nack_id(&id);
        assert!(subscriber.consumer("a").unwrap().acked().is_empty());
    }

    // =============================================================================
    // TELEMETRY
    // =============================================================================

    #[test]
    fn test_second_logging_init_rejected() {
        init_test_logging();
        let result = init_logging(&TelemetryConfig::for_tests());
        assert!(matches!(
            result,
            Err(TelemetryError::AlreadyInitialized) | Err(TelemetryError::Config(_))
        ));
    }
}
