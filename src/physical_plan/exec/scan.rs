use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use datafusion::{
    common::project_schema,
    execution::{SendableRecordBatchStream, TaskContext},
    physical_plan::{
        stream::RecordBatchStreamAdapter, DisplayAs, DisplayFormatType, ExecutionPlan,
        PlanProperties,
    },
};
use datafusion_common::DataFusionError;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::catalog::PulsarCatalog;
use crate::offsets::RangePlan;
use crate::physical_plan::reader::MessageReader;
use crate::physical_plan::{create_plan_properties, messages_to_batch, pulsar_schema};

/// Reads the messages of every planned partition.
///
/// Ranges are resolved when the plan is executed, not when it is built, so
/// executing the same plan twice picks up messages appended in between.
#[derive(Debug)]
pub struct PulsarScanExec {
    plan: RangePlan,
    catalog: Arc<dyn PulsarCatalog>,
    reader: Arc<dyn MessageReader>,
    projection: Option<Vec<usize>>,
    /// Maximum number of partitions read at once.
    read_concurrency: usize,
    plan_properties: PlanProperties,
}

impl PulsarScanExec {
    pub fn try_new(
        plan: RangePlan,
        catalog: Arc<dyn PulsarCatalog>,
        reader: Arc<dyn MessageReader>,
        projection: Option<Vec<usize>>,
        read_concurrency: usize,
    ) -> Result<Self, DataFusionError> {
        let schema = project_schema(&pulsar_schema(), projection.as_ref())?;
        Ok(Self {
            plan,
            catalog,
            reader,
            projection,
            read_concurrency: read_concurrency.max(1),
            plan_properties: create_plan_properties(schema),
        })
    }

    pub fn range_plan(&self) -> &RangePlan {
        &self.plan
    }
}

impl DisplayAs for PulsarScanExec {
    fn fmt_as(&self, t: DisplayFormatType, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match t {
            DisplayFormatType::Default => write!(
                f,
                "PulsarScanExec: partitions={}",
                self.plan.bounds().len()
            ),
            DisplayFormatType::Verbose => {
                write!(f, "PulsarScanExec: ranges=[")?;
                for (i, bound) in self.plan.bounds().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "{}: {}..{}",
                        bound.partition, bound.start.boundary, bound.end.boundary
                    )?;
                }
                write!(f, "], projection={:?}", self.projection)
            }
            DisplayFormatType::TreeRender => write!(f, "PulsarScanExec"),
        }
    }
}

impl ExecutionPlan for PulsarScanExec {
    fn name(&self) -> &str {
        "PulsarScanExec"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.plan_properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        _children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> Result<Arc<dyn ExecutionPlan>, DataFusionError> {
        Ok(self)
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> Result<SendableRecordBatchStream, DataFusionError> {
        if partition != 0 {
            return Err(DataFusionError::Internal(
                "PulsarScanExec only supports a single partition".to_string(),
            ));
        }

        let plan = self.plan.clone();
        let catalog = Arc::clone(&self.catalog);
        let reader = Arc::clone(&self.reader);
        let projection = self.projection.clone();
        let read_concurrency = self.read_concurrency;

        let batches = stream::once(async move {
            // Fresh ranges for every execution.
            let ranges = plan.resolve(catalog.as_ref()).await?;
            log::info!("Reading {} partition range(s)", ranges.len());

            let reads = stream::iter(ranges.into_values().filter(|range| !range.is_empty()))
                .map(move |range| {
                    let reader = Arc::clone(&reader);
                    let projection = projection.clone();
                    async move {
                        let messages = reader
                            .read_range(&range)
                            .await
                            .map_err(|e| e.at_partition(&range.partition))?;
                        log::debug!("Read {} message(s) from {range}", messages.len());
                        let batch = messages_to_batch(&range.partition, &messages)?;
                        let batch = match &projection {
                            Some(indices) => batch.project(indices)?,
                            None => batch,
                        };
                        Ok::<_, DataFusionError>(batch)
                    }
                })
                .buffered(read_concurrency);
            Ok::<_, DataFusionError>(reads)
        })
        .try_flatten();

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            self.schema(),
            batches,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use crate::offsets::{OffsetResolver, OffsetSpec};
    use crate::types::{ReadMode, TopicPartition};
    use arrow::array::{Array, BinaryArray};
    use arrow::record_batch::RecordBatch;

    fn values(batches: &[RecordBatch]) -> Vec<String> {
        let mut values: Vec<String> = batches
            .iter()
            .flat_map(|batch| {
                let column = batch
                    .column_by_name("value")
                    .unwrap()
                    .as_any()
                    .downcast_ref::<BinaryArray>()
                    .unwrap();
                (0..column.len())
                    .map(|i| String::from_utf8(column.value(i).to_vec()).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect();
        values.sort();
        values
    }

    fn exec(broker: &Arc<MemoryBroker>, partitions: &[TopicPartition]) -> PulsarScanExec {
        let plan = RangePlan::try_new(
            OffsetResolver::new(ReadMode::Batch),
            partitions,
            &OffsetSpec::Earliest,
            &OffsetSpec::Latest,
        )
        .unwrap();
        PulsarScanExec::try_new(plan, broker.clone(), broker.clone(), None, 2).unwrap()
    }

    #[tokio::test]
    async fn test_scan_reresolves_on_every_execution() -> datafusion::common::Result<()> {
        let broker = Arc::new(MemoryBroker::new());
        let topic = broker.create_topic("t", 2)?;
        broker.produce(&topic, ["a", "b", "c"])?;
        let partitions = [
            TopicPartition::new(topic.clone(), Some(0)),
            TopicPartition::new(topic.clone(), Some(1)),
        ];
        let exec = exec(&broker, &partitions);

        let task_ctx = Arc::new(TaskContext::default());
        let stream = exec.execute(0, task_ctx.clone())?;
        let batches = datafusion::physical_plan::common::collect(stream).await?;
        assert_eq!(values(&batches), vec!["a", "b", "c"]);

        broker.produce(&topic, ["d"])?;
        let stream = exec.execute(0, task_ctx)?;
        let batches = datafusion::physical_plan::common::collect(stream).await?;
        assert_eq!(values(&batches), vec!["a", "b", "c", "d"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_skips_empty_partitions() -> datafusion::common::Result<()> {
        let broker = Arc::new(MemoryBroker::new());
        let topic = broker.create_topic("empty", 0)?;
        let exec = exec(&broker, &[TopicPartition::unpartitioned(topic)]);

        let stream = exec.execute(0, Arc::new(TaskContext::default()))?;
        let batches = datafusion::physical_plan::common::collect(stream).await?;
        assert!(batches.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_projection() -> datafusion::common::Result<()> {
        let broker = Arc::new(MemoryBroker::new());
        let topic = broker.create_topic("t", 0)?;
        broker.produce(&topic, ["x"])?;
        let plan = RangePlan::try_new(
            OffsetResolver::new(ReadMode::Batch),
            &[TopicPartition::unpartitioned(topic)],
            &OffsetSpec::Earliest,
            &OffsetSpec::Latest,
        )?;
        let exec = PulsarScanExec::try_new(plan, broker.clone(), broker, Some(vec![1, 2]), 4)?;
        assert_eq!(exec.schema().fields().len(), 2);

        let stream = exec.execute(0, Arc::new(TaskContext::default()))?;
        let batches = datafusion::physical_plan::common::collect(stream).await?;
        assert_eq!(batches[0].num_columns(), 2);
        assert_eq!(values(&batches), vec!["x"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_fails_when_topic_disappears() {
        let broker = Arc::new(MemoryBroker::new());
        let exec = exec(
            &broker,
            &[TopicPartition::unpartitioned("persistent://public/default/gone")],
        );

        let stream = exec.execute(0, Arc::new(TaskContext::default())).unwrap();
        let err = datafusion::physical_plan::common::collect(stream)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gone"), "{err}");
    }

    #[tokio::test]
    async fn test_scan_exec_invalid_partition() {
        let broker = Arc::new(MemoryBroker::new());
        let exec = exec(&broker, &[]);

        let task_ctx = Arc::new(TaskContext::default());
        match exec.execute(1, task_ctx) {
            Err(e) => assert!(
                e.to_string()
                    .contains("PulsarScanExec only supports a single partition"),
                "unexpected error message: {}",
                e
            ),
            Ok(_) => panic!("expected an error"),
        }
    }
}
