//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-memory implementations of the outbound ports. They stand in for a
//! broker client in tests and local runs.

mod dead_letter;
mod in_memory;
mod lifecycle;

pub use dead_letter::InMemoryDeadLetterRouter;
pub use in_memory::{InMemorySubscriber, InMemoryTopicConsumer};
pub use lifecycle::{LifecycleEvent, LifecycleLog};
