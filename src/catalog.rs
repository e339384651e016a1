//! Broker metadata access.
//!
//! [`PulsarCatalog`] is the seam to the broker's admin interface. The
//! resolver never talks to it directly: it reads a [`BrokerSnapshot`], an
//! immutable value captured right before each resolution, so that `latest`
//! always means "latest as of this capture". Explicit message ids are looked
//! up once per capture with [`BrokerSnapshot::confirm_messages`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::Result;
use crate::types::{MessageId, TopicPartition};

/// Topic administration and lookup, implemented by a broker client.
#[async_trait]
pub trait PulsarCatalog: fmt::Debug + Send + Sync {
    /// Fully-qualified names of all topics visible to the client.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Number of partitions of `topic`; `0` for a non-partitioned topic.
    async fn partition_count(&self, topic: &str) -> Result<u32>;

    /// Identifier of the oldest retained message of `partition`, or the
    /// position the next message will take if nothing is retained.
    async fn earliest_message_id(&self, partition: &TopicPartition) -> Result<MessageId>;

    /// Identifier of the newest message of `partition`. For an empty partition
    /// this is ordered before [`PulsarCatalog::earliest_message_id`].
    async fn latest_message_id(&self, partition: &TopicPartition) -> Result<MessageId>;

    /// Whether `partition` still holds a message with identifier `id`.
    async fn message_exists(&self, partition: &TopicPartition, id: MessageId) -> Result<bool>;
}

/// Retained message bounds of one partition at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionState {
    pub earliest: MessageId,
    pub latest: MessageId,
}

impl PartitionState {
    pub fn new(earliest: MessageId, latest: MessageId) -> Self {
        Self { earliest, latest }
    }

    pub fn is_empty(&self) -> bool {
        self.latest < self.earliest
    }

    pub fn retains(&self, id: &MessageId) -> bool {
        self.earliest <= *id && *id <= self.latest
    }
}

/// Per-partition broker state captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerSnapshot {
    states: BTreeMap<TopicPartition, PartitionState>,
    /// Explicit ids the broker confirmed to exist.
    messages: BTreeSet<(TopicPartition, MessageId)>,
}

impl BrokerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the state of `partitions`. Partitions are queried concurrently
    /// and the capture fails as a whole if any of them fails.
    pub async fn capture(
        catalog: &dyn PulsarCatalog,
        partitions: &[TopicPartition],
    ) -> Result<Self> {
        let states = try_join_all(partitions.iter().map(|partition| async move {
            let (earliest, latest) = futures::try_join!(
                catalog.earliest_message_id(partition),
                catalog.latest_message_id(partition)
            )
            .map_err(|e| e.at_partition(partition))?;
            Ok::<_, crate::error::PulsarError>((
                partition.clone(),
                PartitionState::new(earliest, latest),
            ))
        }))
        .await?;

        log::debug!("Captured broker state for {} partition(s)", states.len());
        Ok(Self {
            states: states.into_iter().collect(),
            messages: BTreeSet::new(),
        })
    }

    /// Asks the broker whether each of `ids` exists on its partition and
    /// records the ones that do. Lookups run concurrently; if any of them
    /// fails, so does the whole call.
    pub async fn confirm_messages(
        mut self,
        catalog: &dyn PulsarCatalog,
        ids: &[(TopicPartition, MessageId)],
    ) -> Result<Self> {
        let found = try_join_all(ids.iter().map(|(partition, id)| async move {
            let exists = catalog
                .message_exists(partition, *id)
                .await
                .map_err(|e| e.at_partition(partition))?;
            Ok::<_, crate::error::PulsarError>(exists.then(|| (partition.clone(), *id)))
        }))
        .await?;

        let confirmed: Vec<_> = found.into_iter().flatten().collect();
        log::debug!(
            "Confirmed {} of {} explicit message id(s)",
            confirmed.len(),
            ids.len()
        );
        self.messages.extend(confirmed);
        Ok(self)
    }

    pub fn with_partition(mut self, partition: TopicPartition, state: PartitionState) -> Self {
        self.states.insert(partition, state);
        self
    }

    pub fn with_message(mut self, partition: TopicPartition, id: MessageId) -> Self {
        self.messages.insert((partition, id));
        self
    }

    /// Whether `id` was confirmed to exist on `partition`.
    pub fn has_message(&self, partition: &TopicPartition, id: &MessageId) -> bool {
        self.messages.contains(&(partition.clone(), *id))
    }

    pub fn state(&self, partition: &TopicPartition) -> Option<&PartitionState> {
        self.states.get(partition)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
