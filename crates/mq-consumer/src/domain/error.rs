//! Error types for the consumer layer

use mq_types::TopicNameError;
use std::time::Duration;
use thiserror::Error;

/// Consumer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    /// The consumer is closing or closed
    #[error("consumer closed")]
    ConsumerClosed,

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed first
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Reconsume requested on a consumer configured without retry
    #[error("this consumer config retry disabled")]
    RetryDisabled,

    /// No owned topic matches the message's topic
    #[error("topic {topic} not in multi topic consumer list")]
    TopicNotFound { topic: String },

    /// Seek is not defined over a fan-in of topics
    #[error("seek command not allowed for multi topic consumer")]
    SeekNotAllowed,

    /// Topic string could not be parsed
    #[error("invalid topic name: {0}")]
    InvalidTopicName(#[from] TopicNameError),

    /// Subscribing to one topic failed
    #[error("unable to subscribe to topic={topic}: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: Box<ConsumerError>,
    },

    /// Unsubscribing from one topic failed
    #[error("unable to unsubscribe from topic={topic} subscription={subscription}: {source}")]
    Unsubscribe {
        topic: String,
        subscription: String,
        #[source]
        source: Box<ConsumerError>,
    },

    /// Several independent failures
    #[error("{}", describe_many(.0))]
    Multiple(Vec<ConsumerError>),

    /// Configuration rejected before any work was done
    #[error("invalid consumer config: {reason}")]
    InvalidConfig { reason: String },

    /// Broker connection problem reported by a topic session
    #[error("connection error: {reason}")]
    Connection { reason: String },

    /// Publishing to a retry or dead-letter topic failed
    #[error("publish error: {reason}")]
    Publish { reason: String },
}

impl ConsumerError {
    /// Collapse a list of failures: none → `None`, one → itself, more → `Multiple`.
    pub fn aggregate(mut errors: Vec<ConsumerError>) -> Option<ConsumerError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ConsumerError::Multiple(errors)),
        }
    }

    /// Failures carried by this error, flattening `Multiple`.
    pub fn failures(&self) -> Vec<&ConsumerError> {
        match self {
            ConsumerError::Multiple(errors) => errors.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }

    /// Whether this is the terminal closed signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConsumerError::ConsumerClosed)
    }
}

fn describe_many(errors: &[ConsumerError]) -> String {
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} errors: {}", errors.len(), joined)
}

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;
