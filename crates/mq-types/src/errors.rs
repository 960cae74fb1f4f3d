//! # Error Types
//!
//! Errors raised while decomposing topic strings.

use thiserror::Error;

/// Errors that can occur while parsing a topic name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicNameError {
    /// The topic string was empty.
    #[error("topic name is empty")]
    Empty,

    /// The scheme before `://` is not a known topic domain.
    #[error("invalid topic domain: {domain}")]
    InvalidDomain { domain: String },

    /// A short form that is neither `<topic>` nor `<tenant>/<namespace>/<topic>`.
    #[error(
        "invalid short topic name '{topic}', it should be in the format of \
         <tenant>/<namespace>/<topic> or <topic>"
    )]
    InvalidShortName { topic: String },

    /// A fully qualified name with the wrong number of path segments.
    #[error("invalid topic name: {topic}")]
    InvalidName { topic: String },

    /// The `-partition-N` suffix does not end in a valid index.
    #[error("invalid partition index in topic name: {topic}")]
    InvalidPartition { topic: String },
}

/// Result type for topic name operations.
pub type TopicNameResult<T> = Result<T, TopicNameError>;
