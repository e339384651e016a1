use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::{Session, TableProvider, TableProviderFactory};
use datafusion::datasource::TableType;
use datafusion::logical_expr::CreateExternalTable;
use datafusion::physical_plan::ExecutionPlan;
use datafusion::prelude::Expr;
use datafusion_common::Result;

use crate::catalog::PulsarCatalog;
use crate::config::{CaseInsensitiveOptions, PulsarOptions, SERVICE_URL_OPTION};
use crate::error::Result as PulsarResult;
use crate::offsets::{OffsetResolver, RangePlan, RangeValidator};
use crate::physical_plan::exec::scan::PulsarScanExec;
use crate::physical_plan::pulsar_schema;
use crate::physical_plan::reader::MessageReader;
use crate::topic::{enumerate_partitions, select_topics};
use crate::types::{ReadMode, ResolvedRanges};

/// A bounded table over one or more Pulsar topics.
///
/// Topic selection and offset resolution run every time the table is
/// planned. The resulting [`PulsarScanExec`] resolves its ranges again when
/// executed, so `latest` always means the tail at the moment reading begins.
#[derive(Debug)]
pub struct PulsarTableProvider {
    options: PulsarOptions,
    catalog: Arc<dyn PulsarCatalog>,
    reader: Arc<dyn MessageReader>,
    schema: SchemaRef,
}

impl PulsarTableProvider {
    /// Creates a provider, rejecting offset options that can never describe
    /// a bounded read before talking to the broker.
    pub fn try_new(
        options: PulsarOptions,
        catalog: Arc<dyn PulsarCatalog>,
        reader: Arc<dyn MessageReader>,
    ) -> PulsarResult<Self> {
        RangeValidator::new(ReadMode::Batch)
            .validate_specs(&options.starting_offsets, &options.ending_offsets)?;
        Ok(Self {
            options,
            catalog,
            reader,
            schema: pulsar_schema(),
        })
    }

    /// Creates a provider backed by a broker that is both catalog and reader.
    pub fn from_broker<B>(options: PulsarOptions, broker: Arc<B>) -> PulsarResult<Self>
    where
        B: PulsarCatalog + MessageReader + 'static,
    {
        Self::try_new(options, broker.clone(), broker)
    }

    pub fn options(&self) -> &PulsarOptions {
        &self.options
    }

    /// Selects topics and partitions as they are now and validates the
    /// boundaries chosen for each partition.
    pub async fn range_plan(&self) -> PulsarResult<RangePlan> {
        let topics = select_topics(&self.options.topics, self.catalog.as_ref()).await?;
        let partitions = enumerate_partitions(&topics, self.catalog.as_ref()).await?;
        log::debug!(
            "Planning {} partition(s) of {} topic(s)",
            partitions.len(),
            topics.len()
        );

        let resolver = OffsetResolver::new(ReadMode::Batch)
            .with_fail_on_data_loss(self.options.fail_on_data_loss);
        RangePlan::try_new(
            resolver,
            &partitions,
            &self.options.starting_offsets,
            &self.options.ending_offsets,
        )
    }

    /// Runs the whole pipeline against the current broker state.
    pub async fn resolve_ranges(&self) -> PulsarResult<ResolvedRanges> {
        self.range_plan().await?.resolve(self.catalog.as_ref()).await
    }
}

#[async_trait]
impl TableProvider for PulsarTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        _limit: Option<usize>,
    ) -> Result<Arc<dyn ExecutionPlan>> {
        let plan = self.range_plan().await?;
        // Resolve once now so bad ids and missing topics fail at planning.
        let planned = plan.resolve(self.catalog.as_ref()).await?;
        for range in planned.values() {
            log::debug!("Planned {range}");
        }

        Ok(Arc::new(PulsarScanExec::try_new(
            plan,
            Arc::clone(&self.catalog),
            Arc::clone(&self.reader),
            projection.cloned(),
            self.options.read_concurrency,
        )?))
    }
}

/// Builds [`PulsarTableProvider`]s for
/// `CREATE EXTERNAL TABLE ... STORED AS PULSAR LOCATION '<service url>'`.
#[derive(Debug)]
pub struct PulsarTableFactory {
    catalog: Arc<dyn PulsarCatalog>,
    reader: Arc<dyn MessageReader>,
}

impl PulsarTableFactory {
    pub fn new(catalog: Arc<dyn PulsarCatalog>, reader: Arc<dyn MessageReader>) -> Self {
        Self { catalog, reader }
    }

    pub fn from_broker<B>(broker: Arc<B>) -> Self
    where
        B: PulsarCatalog + MessageReader + 'static,
    {
        Self::new(broker.clone(), broker)
    }
}

#[async_trait]
impl TableProviderFactory for PulsarTableFactory {
    async fn create(
        &self,
        _state: &dyn Session,
        cmd: &CreateExternalTable,
    ) -> Result<Arc<dyn TableProvider>> {
        let mut options = CaseInsensitiveOptions::new(cmd.options.iter().map(|(key, value)| {
            (
                key.strip_prefix("format.").unwrap_or(key),
                value.clone(),
            )
        }));
        if !options.contains(SERVICE_URL_OPTION) && !cmd.location.trim().is_empty() {
            options.insert(SERVICE_URL_OPTION, cmd.location.trim());
        }

        let options = PulsarOptions::from_case_insensitive(&options)?;
        log::info!(
            "Creating Pulsar table {} over {}",
            cmd.name,
            options.topics.option_key()
        );
        let provider =
            PulsarTableProvider::try_new(options, Arc::clone(&self.catalog), Arc::clone(&self.reader))?;
        Ok(Arc::new(provider))
    }
}
