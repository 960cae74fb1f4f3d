//! # Shared Message Types
//!
//! Data model shared by per-topic consumer sessions and the multi-topic
//! aggregator that sits on top of them.
//!
//! ## Design Principles
//!
//! - **Non-owning back-references**: a [`MessageId`] names the session that
//!   produced it through a [`ConsumerId`] lookup key, never through a live
//!   handle. An id stays inspectable after its session is gone.
//! - **Tagged fan-in**: every [`ConsumerMessage`] pushed into a shared channel
//!   carries the id of its origin session.
//! - **Structured topic names**: [`TopicName`] decomposes a topic string so
//!   differently formatted names for the same topic can be compared.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod errors;
pub mod topic_name;

pub use entities::{
    properties, ConsumerId, ConsumerMessage, Message, MessageId, ProducerMessage,
};
pub use errors::{TopicNameError, TopicNameResult};
pub use topic_name::{TopicDomain, TopicName, DEFAULT_NAMESPACE, PUBLIC_TENANT};
