//! Error types raised while configuring and resolving a Pulsar scan.
//!
//! Every variant is a planning-time failure: nothing here is retried and no
//! partially resolved range set is ever handed to execution.

use datafusion::error::DataFusionError;
use thiserror::Error;

use crate::config::{TOPICS_OPTION, TOPICS_PATTERN_OPTION, TOPIC_OPTION};

/// Result alias used throughout the resolution pipeline.
pub type Result<T, E = PulsarError> = std::result::Result<T, E>;

/// Boxed error produced by an external collaborator (catalog, reader).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PulsarError {
    /// No topic strategy was configured.
    #[error(
        "one of the topic options '{}', '{}' or '{}' must be specified",
        TOPIC_OPTION,
        TOPICS_OPTION,
        TOPICS_PATTERN_OPTION
    )]
    MissingTopicOption,

    /// More than one topic strategy was configured.
    #[error("only one of the topic options may be set, found: {}", .keys.join(", "))]
    ConflictingTopicOptions { keys: Vec<&'static str> },

    /// The configured strategy carries an empty value.
    #[error("{message} (option '{key}')")]
    EmptyTopicOption {
        key: &'static str,
        message: &'static str,
    },

    #[error("invalid topic name '{name}': {reason}")]
    InvalidTopicName { name: String, reason: String },

    #[error("invalid topics pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An option value could not be interpreted.
    #[error("invalid value for option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    /// Malformed starting/ending offsets text.
    #[error("failed to parse {key}: {message}")]
    OffsetParse { key: &'static str, message: String },

    /// `latest` used as a start boundary in batch mode.
    #[error("{}", directional_message("starting", "latest", .topic.as_deref()))]
    StartingOffsetLatest { topic: Option<String> },

    /// `earliest` used as an end boundary in batch mode.
    #[error("{}", directional_message("ending", "earliest", .topic.as_deref()))]
    EndingOffsetEarliest { topic: Option<String> },

    /// An offsets entry does not match any selected topic or partition.
    #[error("{key} references {topic}, which is not a partition of the selected topics")]
    UnknownPartition { key: &'static str, topic: String },

    /// An explicit message id is not usable on the partition it targets.
    #[error("message id {id} is not valid for {partition}: {reason}")]
    InvalidMessageId {
        partition: String,
        id: String,
        reason: String,
    },

    /// The catalog or reader reported that a topic does not exist.
    #[error("topic {0} does not exist")]
    TopicNotFound(String),

    /// Error reported by the broker collaborator, passed through unchanged.
    #[error("broker error: {0}")]
    Broker(#[source] BoxError),

    /// Annotates a collaborator failure with the partition it happened on.
    #[error("failed to resolve {partition}: {source}")]
    Partition {
        partition: String,
        #[source]
        source: Box<PulsarError>,
    },
}

fn directional_message(side: &str, keyword: &str, topic: Option<&str>) -> String {
    match topic {
        Some(topic) => format!("{side} offset for {topic} can't be {keyword} for batch queries"),
        None => format!("{side} offset can't be {keyword} for batch queries"),
    }
}

impl PulsarError {
    pub fn broker(message: impl Into<String>) -> Self {
        let message: String = message.into();
        PulsarError::Broker(message.into())
    }

    /// Wraps `self` with the partition it was raised for. Errors that already
    /// name their partition are left as they are.
    pub fn at_partition(self, partition: impl ToString) -> Self {
        match self {
            err @ (PulsarError::Partition { .. } | PulsarError::InvalidMessageId { .. }) => err,
            err => PulsarError::Partition {
                partition: partition.to_string(),
                source: Box::new(err),
            },
        }
    }
}

impl From<PulsarError> for DataFusionError {
    fn from(err: PulsarError) -> Self {
        DataFusionError::External(Box::new(err))
    }
}
