//! Common type definitions used throughout the crate.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{PulsarError, Result};

/// Suffix Pulsar appends to a partitioned topic name to address one partition.
pub const PARTITION_SUFFIX: &str = "-partition-";

/// One partition of one topic.
///
/// `topic` is always the fully-qualified parent topic name. A non-partitioned
/// topic is its own single partition and has no `index`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub index: Option<u32>,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, index: Option<u32>) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }

    /// A non-partitioned topic.
    pub fn unpartitioned(topic: impl Into<String>) -> Self {
        Self::new(topic, None)
    }

    /// The name the broker knows this partition by, e.g.
    /// `persistent://public/default/events-partition-2`.
    pub fn name(&self) -> String {
        match self.index {
            Some(index) => format!("{}{PARTITION_SUFFIX}{index}", self.topic),
            None => self.topic.clone(),
        }
    }

    /// The partition index as carried inside a [`MessageId`].
    pub fn message_partition(&self) -> Result<i32> {
        let Some(index) = self.index else {
            return Ok(-1);
        };
        i32::try_from(index).map_err(|_| PulsarError::InvalidTopicName {
            name: self.name(),
            reason: "partition index does not fit in a message id".to_string(),
        })
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Position of a message in a partition: a ledger/entry pair plus the index
/// of the partition it was written to (`-1` for non-partitioned topics).
///
/// Identifiers are ordered by ledger, then entry. The partition only breaks
/// ties between identifiers of different partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub partition: i32,
}

impl MessageId {
    pub const fn new(ledger_id: i64, entry_id: i64, partition: i32) -> Self {
        Self {
            ledger_id,
            entry_id,
            partition,
        }
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ledger_id
            .cmp(&other.ledger_id)
            .then(self.entry_id.cmp(&other.entry_id))
            .then(self.partition.cmp(&other.partition))
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ledger_id, self.entry_id, self.partition)
    }
}

impl FromStr for MessageId {
    type Err = String;

    /// Parses `ledger:entry:partition`. The partition may be omitted, in which
    /// case it is `-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(format!(
                "expected '<ledger>:<entry>:<partition>' but got '{s}'"
            ));
        }
        let field = |value: &str, what: &str| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid {what} '{value}' in message id '{s}': {e}"))
        };
        let ledger_id = field(parts[0], "ledger id")?;
        let entry_id = field(parts[1], "entry id")?;
        let partition = match parts.get(2) {
            Some(value) => {
                let partition = field(value, "partition")?;
                i32::try_from(partition)
                    .ok()
                    .filter(|p| *p >= -1)
                    .ok_or_else(|| format!("partition out of range in message id '{s}'"))?
            }
            None => -1,
        };
        Ok(MessageId::new(ledger_id, entry_id, partition))
    }
}

/// A read boundary for one partition.
///
/// `Latest` is not a fixed position: it denotes the newest message at the time
/// the boundary is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIdBoundary {
    Earliest,
    Latest,
    Explicit(MessageId),
}

impl MessageIdBoundary {
    pub fn tag(&self) -> BoundaryTag {
        match self {
            MessageIdBoundary::Earliest => BoundaryTag::Earliest,
            MessageIdBoundary::Latest => BoundaryTag::Latest,
            MessageIdBoundary::Explicit(_) => BoundaryTag::Explicit,
        }
    }
}

impl fmt::Display for MessageIdBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageIdBoundary::Earliest => f.write_str("earliest"),
            MessageIdBoundary::Latest => f.write_str("latest"),
            MessageIdBoundary::Explicit(id) => write!(f, "{id}"),
        }
    }
}

/// The kind of boundary a resolved identifier was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryTag {
    Earliest,
    Latest,
    Explicit,
}

impl fmt::Display for BoundaryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryTag::Earliest => f.write_str("earliest"),
            BoundaryTag::Latest => f.write_str("latest"),
            BoundaryTag::Explicit => f.write_str("explicit"),
        }
    }
}

/// A concrete identifier together with the tag it was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBoundary {
    pub tag: BoundaryTag,
    pub id: MessageId,
}

/// The inclusive message-id range read from one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub partition: TopicPartition,
    pub start: ResolvedBoundary,
    pub end: ResolvedBoundary,
}

impl ResolvedRange {
    /// A range whose start is ordered after its end contributes no rows.
    pub fn is_empty(&self) -> bool {
        self.start.id > self.end.id
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.start.id <= *id && *id <= self.end.id
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}=[{} ({}), {} ({})]",
            self.partition, self.start.id, self.start.tag, self.end.id, self.end.tag
        )
    }
}

/// Resolved ranges for every partition of one scan.
pub type ResolvedRanges = BTreeMap<TopicPartition, ResolvedRange>;

/// Whether a scan is a bounded (batch) or continuous read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Batch,
    Streaming,
}

impl From<MessageId> for MessageIdBoundary {
    fn from(id: MessageId) -> Self {
        MessageIdBoundary::Explicit(id)
    }
}
