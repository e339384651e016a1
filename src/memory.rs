//! An in-process broker.
//!
//! [`MemoryBroker`] implements both [`PulsarCatalog`] and [`MessageReader`].
//! Every partition writes to one open ledger whose entries are numbered from
//! zero. [`MemoryBroker::roll_ledger`] closes it and opens a new one, so a
//! partition's message ids can span non-contiguous ledgers. Retention can be
//! simulated with [`MemoryBroker::trim`].

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::catalog::PulsarCatalog;
use crate::error::{PulsarError, Result};
use crate::physical_plan::reader::{Message, MessageReader};
use crate::topic::normalize_topic_name;
use crate::types::{MessageId, ResolvedRange, TopicPartition};

#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: RwLock<BrokerState>,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_ledger_id: i64,
    topics: BTreeMap<String, TopicLog>,
}

#[derive(Debug)]
struct TopicLog {
    partitioned: bool,
    partitions: Vec<PartitionLog>,
    /// Round-robin cursor for [`MemoryBroker::produce`].
    next_partition: usize,
}

#[derive(Debug)]
struct PartitionLog {
    /// The ledger new messages are written to.
    ledger_id: i64,
    partition: i32,
    next_entry: i64,
    messages: Vec<Message>,
}

impl PartitionLog {
    /// The oldest retained message, or the position of the next message if
    /// nothing is retained.
    fn earliest(&self) -> MessageId {
        self.messages
            .first()
            .map(|message| message.id)
            .unwrap_or_else(|| MessageId::new(self.ledger_id, self.next_entry, self.partition))
    }

    fn latest(&self) -> MessageId {
        self.messages
            .last()
            .map(|message| message.id)
            .unwrap_or_else(|| MessageId::new(self.ledger_id, self.next_entry - 1, self.partition))
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.messages
            .binary_search_by(|message| message.id.cmp(id))
            .is_ok()
    }

    fn append(&mut self, key: Option<&str>, payload: Vec<u8>) -> MessageId {
        let id = MessageId::new(self.ledger_id, self.next_entry, self.partition);
        self.next_entry += 1;
        self.messages.push(Message {
            id,
            key: key.map(str::to_string),
            payload,
            publish_time: now_millis(),
        });
        id
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a topic with `partitions` partitions (`0` for a
    /// non-partitioned topic) and returns its fully-qualified name.
    pub fn create_topic(&self, name: &str, partitions: u32) -> Result<String> {
        let topic = normalize_topic_name(name)?;
        let mut state = self.write()?;
        if state.topics.contains_key(&topic) {
            return Err(PulsarError::broker(format!("topic {topic} already exists")));
        }

        let indexes: Vec<i32> = if partitions == 0 {
            vec![-1]
        } else {
            let count = i32::try_from(partitions).map_err(|_| {
                PulsarError::broker(format!("{partitions} partitions is more than a topic can hold"))
            })?;
            (0..count).collect()
        };
        let mut logs = Vec::with_capacity(indexes.len());
        for partition in indexes {
            state.next_ledger_id += 1;
            logs.push(PartitionLog {
                ledger_id: state.next_ledger_id,
                partition,
                next_entry: 0,
                messages: Vec::new(),
            });
        }
        state.topics.insert(
            topic.clone(),
            TopicLog {
                partitioned: partitions > 0,
                partitions: logs,
                next_partition: 0,
            },
        );
        log::debug!("Created topic {topic} with {partitions} partition(s)");
        Ok(topic)
    }

    /// Appends one message to `partition` of `topic` (`None` for a
    /// non-partitioned topic).
    pub fn send(
        &self,
        topic: &str,
        partition: Option<u32>,
        key: Option<&str>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<MessageId> {
        let tp = TopicPartition::new(normalize_topic_name(topic)?, partition);
        let mut state = self.write()?;
        let log = partition_log_mut(&mut state, &tp)?;
        Ok(log.append(key, payload.into()))
    }

    /// Appends `payloads` to `topic`, spreading them round-robin over its
    /// partitions.
    pub fn produce<I, P>(&self, topic: &str, payloads: I) -> Result<Vec<MessageId>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let topic = normalize_topic_name(topic)?;
        let mut state = self.write()?;
        let log = state
            .topics
            .get_mut(&topic)
            .ok_or_else(|| PulsarError::TopicNotFound(topic.clone()))?;

        let ids = payloads
            .into_iter()
            .map(|payload| {
                let slot = log.next_partition % log.partitions.len();
                log.next_partition += 1;
                log.partitions[slot].append(None, payload.into())
            })
            .collect();
        Ok(ids)
    }

    /// Drops every message of `partition` older than `retain_from`.
    pub fn trim(&self, partition: &TopicPartition, retain_from: MessageId) -> Result<()> {
        let mut state = self.write()?;
        let log = partition_log_mut(&mut state, partition)?;
        log.messages.retain(|message| message.id >= retain_from);
        Ok(())
    }

    /// Closes the open ledger of `partition` and starts writing to a new one.
    /// Ledger ids are allocated broker-wide, so the partition's ledgers are
    /// usually not consecutive.
    pub fn roll_ledger(&self, partition: &TopicPartition) -> Result<i64> {
        let mut state = self.write()?;
        state.next_ledger_id += 1;
        let ledger_id = state.next_ledger_id;
        let log = partition_log_mut(&mut state, partition)?;
        log.ledger_id = ledger_id;
        log.next_entry = 0;
        log::debug!("Rolled {partition} over to ledger {ledger_id}");
        Ok(ledger_id)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BrokerState>> {
        self.state
            .read()
            .map_err(|_| PulsarError::broker("memory broker state is poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BrokerState>> {
        self.state
            .write()
            .map_err(|_| PulsarError::broker("memory broker state is poisoned"))
    }

    fn with_partition<T>(
        &self,
        partition: &TopicPartition,
        f: impl FnOnce(&PartitionLog) -> T,
    ) -> Result<T> {
        let state = self.read()?;
        let topic = state
            .topics
            .get(&partition.topic)
            .ok_or_else(|| PulsarError::TopicNotFound(partition.topic.clone()))?;
        let log = match (topic.partitioned, partition.index) {
            (false, None) => topic.partitions.first(),
            (true, Some(index)) => topic.partitions.get(index as usize),
            _ => None,
        }
        .ok_or_else(|| PulsarError::TopicNotFound(partition.name()))?;
        Ok(f(log))
    }
}

fn partition_log_mut<'a>(
    state: &'a mut BrokerState,
    partition: &TopicPartition,
) -> Result<&'a mut PartitionLog> {
    let topic = state
        .topics
        .get_mut(&partition.topic)
        .ok_or_else(|| PulsarError::TopicNotFound(partition.topic.clone()))?;
    let log = match (topic.partitioned, partition.index) {
        (false, None) => topic.partitions.first_mut(),
        (true, Some(index)) => topic.partitions.get_mut(index as usize),
        _ => None,
    };
    log.ok_or_else(|| PulsarError::TopicNotFound(partition.name()))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[async_trait]
impl PulsarCatalog for MemoryBroker {
    async fn list_topics(&self) -> Result<Vec<String>> {
        Ok(self.read()?.topics.keys().cloned().collect())
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        let state = self.read()?;
        let log = state
            .topics
            .get(topic)
            .ok_or_else(|| PulsarError::TopicNotFound(topic.to_string()))?;
        Ok(if log.partitioned {
            log.partitions.len() as u32
        } else {
            0
        })
    }

    async fn earliest_message_id(&self, partition: &TopicPartition) -> Result<MessageId> {
        self.with_partition(partition, PartitionLog::earliest)
    }

    async fn latest_message_id(&self, partition: &TopicPartition) -> Result<MessageId> {
        self.with_partition(partition, PartitionLog::latest)
    }

    async fn message_exists(&self, partition: &TopicPartition, id: MessageId) -> Result<bool> {
        self.with_partition(partition, |log| log.contains(&id))
    }
}

#[async_trait]
impl MessageReader for MemoryBroker {
    async fn read_range(&self, range: &ResolvedRange) -> Result<Vec<Message>> {
        self.with_partition(&range.partition, |log| {
            log.messages
                .iter()
                .filter(|message| range.contains(&message.id))
                .cloned()
                .collect()
        })
    }
}
