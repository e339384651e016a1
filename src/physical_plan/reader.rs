use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MessageId, ResolvedRange};

/// A message as returned by a [`MessageReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub publish_time: i64,
}

/// Fetches the messages of one resolved range.
#[async_trait]
pub trait MessageReader: Send + Sync + std::fmt::Debug {
    /// Returns every message of `range.partition` whose id lies within
    /// `[range.start.id, range.end.id]`, in id order.
    ///
    /// The implementor must not read past `range.end.id`, even if newer
    /// messages have been written since the range was resolved.
    async fn read_range(&self, range: &ResolvedRange) -> Result<Vec<Message>>;
}
