pub mod exec;
pub mod reader;

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use datafusion::common::Result;
use datafusion::physical_expr::EquivalenceProperties;
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::{Partitioning, PlanProperties};

use crate::physical_plan::reader::Message;
use crate::types::TopicPartition;

pub const KEY_COLUMN_NAME: &str = "__key";
pub const VALUE_COLUMN_NAME: &str = "value";
pub const TOPIC_COLUMN_NAME: &str = "__topic";
pub const MESSAGE_ID_COLUMN_NAME: &str = "__messageId";
pub const PUBLISH_TIME_COLUMN_NAME: &str = "__publishTime";

/// Schema of every Pulsar table: the raw payload plus message metadata.
pub fn pulsar_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(KEY_COLUMN_NAME, DataType::Utf8, true),
        Field::new(VALUE_COLUMN_NAME, DataType::Binary, false),
        Field::new(TOPIC_COLUMN_NAME, DataType::Utf8, false),
        Field::new(MESSAGE_ID_COLUMN_NAME, DataType::Utf8, false),
        Field::new(
            PUBLISH_TIME_COLUMN_NAME,
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
    ]))
}

/// Creates the `PlanProperties` of a bounded, single-partition scan.
pub fn create_plan_properties(schema: SchemaRef) -> PlanProperties {
    PlanProperties::new(
        EquivalenceProperties::new(schema),
        Partitioning::UnknownPartitioning(1),
        EmissionType::Incremental,
        Boundedness::Bounded,
    )
}

/// Converts the messages read from `partition` into a batch with
/// [`pulsar_schema`].
pub fn messages_to_batch(partition: &TopicPartition, messages: &[Message]) -> Result<RecordBatch> {
    let topic = partition.name();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            messages
                .iter()
                .map(|message| message.key.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(BinaryArray::from_iter_values(
            messages.iter().map(|message| message.payload.as_slice()),
        )),
        Arc::new(StringArray::from_iter_values(
            messages.iter().map(|_| topic.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            messages.iter().map(|message| message.id.to_string()),
        )),
        Arc::new(TimestampMillisecondArray::from(
            messages
                .iter()
                .map(|message| message.publish_time)
                .collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(pulsar_schema(), columns)?)
}
