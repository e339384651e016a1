pub mod failing_catalog;

use datafusion::arrow::array::{Array, BinaryArray, RecordBatch, StringArray};
use datafusion::execution::context::SessionContext;
use datafusion_pulsar_provider::{MemoryBroker, PulsarOptions, PulsarTableProvider};
use std::sync::Arc;

pub const SERVICE_URL: &str = "pulsar://localhost:6650";

pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Helper function to setup a broker and an empty session
pub fn setup_test_env() -> (Arc<MemoryBroker>, SessionContext) {
    init_logging();
    (Arc::new(MemoryBroker::new()), SessionContext::new())
}

/// Registers a table named `name` built from raw option pairs.
pub fn register_table(
    ctx: &SessionContext,
    broker: &Arc<MemoryBroker>,
    name: &str,
    options: &[(&str, &str)],
) -> datafusion::error::Result<()> {
    let mut pairs: Vec<(&str, &str)> = vec![("service.url", SERVICE_URL)];
    pairs.extend_from_slice(options);
    let options = PulsarOptions::from_options(pairs)?;
    let provider = PulsarTableProvider::from_broker(options, broker.clone())?;
    ctx.register_table(name, Arc::new(provider))?;
    Ok(())
}

pub async fn query(ctx: &SessionContext, sql: &str) -> datafusion::error::Result<Vec<RecordBatch>> {
    ctx.sql(sql).await?.collect().await
}

/// Payloads of the `value` column as sorted strings.
pub fn values(results: &[RecordBatch]) -> Vec<String> {
    let mut values = Vec::new();
    for batch in results {
        let column = batch
            .column_by_name("value")
            .unwrap()
            .as_any()
            .downcast_ref::<BinaryArray>()
            .unwrap();
        for i in 0..column.len() {
            values.push(String::from_utf8(column.value(i).to_vec()).unwrap());
        }
    }
    values.sort();
    values
}

/// Sorted, de-duplicated strings of a Utf8 column.
pub fn distinct_strings(results: &[RecordBatch], column: &str) -> Vec<String> {
    let mut strings: Vec<String> = results
        .iter()
        .flat_map(|batch| {
            let array = batch
                .column_by_name(column)
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            array
                .iter()
                .flatten()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    strings.sort();
    strings.dedup();
    strings
}

/// `"from".."to"` inclusive, as strings.
pub fn numbers(from: u32, to: u32) -> Vec<String> {
    let mut numbers: Vec<String> = (from..=to).map(|n| n.to_string()).collect();
    numbers.sort();
    numbers
}
