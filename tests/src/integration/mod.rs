//! Cross-crate scenarios driven through the in-memory adapters.

pub mod flows;
pub mod lifecycle;

use mq_consumer::{
    ConsumerConfig, ConsumerResult, DeadLetterRouter, InMemoryDeadLetterRouter,
    InMemorySubscriber, MultiTopicConsumer,
};
use mq_telemetry::{init_logging, TelemetryConfig};
use std::sync::{Arc, Once};

static LOGGING: Once = Once::new();

/// Install test logging once per process.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        if let Err(e) = init_logging(&TelemetryConfig::for_tests()) {
            eprintln!("test logging not installed: {e}");
        }
    });
}

pub fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Consumer over `names` with a fresh router, as the application would build it.
pub async fn subscribe(
    config: ConsumerConfig,
    names: &[&str],
    subscriber: &InMemorySubscriber,
) -> (ConsumerResult<MultiTopicConsumer>, Arc<InMemoryDeadLetterRouter>) {
    init_test_logging();
    let dlq = Arc::new(InMemoryDeadLetterRouter::new());
    let consumer = MultiTopicConsumer::subscribe(
        config,
        &topics(names),
        subscriber,
        Arc::clone(&dlq) as Arc<dyn DeadLetterRouter>,
    )
    .await;
    (consumer, dlq)
}
