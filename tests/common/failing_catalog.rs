use async_trait::async_trait;
use datafusion_pulsar_provider::{
    MemoryBroker, MessageId, PulsarCatalog, PulsarError, Result, TopicPartition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Delegates to a [`MemoryBroker`] but fails every tail lookup of one
/// partition.
#[derive(Debug)]
pub struct FailingCatalog {
    inner: Arc<MemoryBroker>,
    failing: TopicPartition,
    pub latest_calls: AtomicUsize,
}

impl FailingCatalog {
    pub fn new(inner: Arc<MemoryBroker>, failing: TopicPartition) -> Self {
        Self {
            inner,
            failing,
            latest_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PulsarCatalog for FailingCatalog {
    async fn list_topics(&self) -> Result<Vec<String>> {
        self.inner.list_topics().await
    }

    async fn partition_count(&self, topic: &str) -> Result<u32> {
        self.inner.partition_count(topic).await
    }

    async fn earliest_message_id(&self, partition: &TopicPartition) -> Result<MessageId> {
        self.inner.earliest_message_id(partition).await
    }

    async fn latest_message_id(&self, partition: &TopicPartition) -> Result<MessageId> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if *partition == self.failing {
            return Err(PulsarError::broker("connection reset by peer"));
        }
        self.inner.latest_message_id(partition).await
    }

    async fn message_exists(&self, partition: &TopicPartition, id: MessageId) -> Result<bool> {
        self.inner.message_exists(partition, id).await
    }
}
