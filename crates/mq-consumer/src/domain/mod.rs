//! # Domain Layer - Multi-Topic Consumer
//!
//! ## Components
//!
//! - `multi_topic`: MultiTopicConsumer, the fan-in aggregator
//! - `channel`: SharedChannel and its MessageChannel read handle
//! - `config`: ConsumerConfig, DlqPolicy, LetterTopics
//! - `types`: ReconsumeOptions, ReconsumeCallback
//! - `error`: ConsumerError enumeration

pub mod channel;
pub mod config;
pub mod error;
pub mod multi_topic;
pub mod types;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use multi_topic::*;
pub use types::*;
