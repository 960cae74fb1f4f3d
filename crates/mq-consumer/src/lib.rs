//! # Multi-Topic Consumer
//!
//! One subscription spanning several topics, presented to the application as
//! a single consumer with a single merged message stream.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Built all-or-nothing: partial subscriptions are closed | `domain/multi_topic.rs` - `MultiTopicConsumer::new` |
//! | Close runs once, sessions before the dead-letter router | `domain/multi_topic.rs` - `close()` |
//! | Receive after close reports closed, even with queued messages | `domain/multi_topic.rs` - biased `select!` |
//! | Ack/nack only reach the session that delivered the message | `domain/multi_topic.rs` - `route()` |
//! | Seek is always rejected | `domain/multi_topic.rs` - `seek()` |
//!
//! ## Message Flow
//!
//! ```text
//! [subscribe] ──► N TopicConsumers ──► SharedChannel ──► receive() / chan()
//!                        ▲                                     │
//!                        └──── ack/nack by MessageId origin ◄──┘
//! ```
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - in-memory sessions, subscriber, dead-letter router │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - Consumer trait                             │
//! │  ports/outbound.rs - TopicConsumer, Subscriber, DeadLetterRouter│
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/multi_topic.rs - MultiTopicConsumer                     │
//! │  domain/channel.rs     - SharedChannel, MessageChannel          │
//! │  domain/config.rs      - ConsumerConfig, DlqPolicy, LetterTopics│
//! │  domain/error.rs       - ConsumerError                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let consumer = MultiTopicConsumer::subscribe(config, &topics, &subscriber, dlq).await?;
//! let message = consumer.receive(&cancel).await?;
//! consumer.ack(&message);
//! consumer.close().await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::inbound::Consumer;
pub use ports::outbound::{
    DeadLetterRouter, SubscribeOutcome, SubscribeOutcomes, Subscriber, TopicConsumer,
};
