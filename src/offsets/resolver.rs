//! Per-partition boundary selection and resolution.
//!
//! Resolution happens in two steps. [`select_bounds`] decides which boundary
//! applies to every partition without looking at the broker. The selected
//! boundaries are then checked by the [`RangeValidator`] and resolved to
//! concrete message ids against a [`BrokerSnapshot`].
//!
//! The resolver holds no state of its own. Resolving the same options against
//! a later snapshot moves every `latest` boundary to the new tail, while
//! explicit ids stay where they are. An explicit id resolves only if the
//! snapshot confirms that the broker holds a message with that id.

use std::collections::BTreeSet;

use crate::catalog::{BrokerSnapshot, PartitionState, PulsarCatalog};
use crate::error::{PulsarError, Result};
use crate::offsets::spec::{OffsetRole, OffsetSpec};
use crate::offsets::validator::RangeValidator;
use crate::types::{
    MessageId, MessageIdBoundary, ReadMode, ResolvedBoundary, ResolvedRange, ResolvedRanges,
    TopicPartition,
};

/// Where a partition's boundary came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundarySource {
    /// The `earliest` / `latest` keyword form of the option.
    Uniform,
    /// The entry with this key in a per-topic option.
    Entry(String),
    /// Not mentioned by a per-topic option.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBoundary {
    pub boundary: MessageIdBoundary,
    pub source: BoundarySource,
}

/// Start and end boundaries chosen for one partition, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBounds {
    pub partition: TopicPartition,
    pub start: SelectedBoundary,
    pub end: SelectedBoundary,
}

/// Chooses the start and end boundary of every partition.
///
/// An entry keyed by a partition's own name wins over an entry keyed by its
/// partitioned parent topic; partitions covered by neither use the role
/// default. Entries that match no partition are rejected.
pub fn select_bounds(
    partitions: &[TopicPartition],
    start: &OffsetSpec,
    end: &OffsetSpec,
) -> Result<Vec<PartitionBounds>> {
    check_entries(partitions, start, OffsetRole::Start)?;
    check_entries(partitions, end, OffsetRole::End)?;

    partitions
        .iter()
        .map(|partition| {
            Ok(PartitionBounds {
                partition: partition.clone(),
                start: select(partition, start, OffsetRole::Start)?,
                end: select(partition, end, OffsetRole::End)?,
            })
        })
        .collect()
}

fn check_entries(partitions: &[TopicPartition], spec: &OffsetSpec, role: OffsetRole) -> Result<()> {
    let OffsetSpec::Specific(entries) = spec else {
        return Ok(());
    };
    let known: BTreeSet<String> = partitions
        .iter()
        .flat_map(|partition| [partition.name(), partition.topic.clone()])
        .collect();
    match entries.keys().find(|key| !known.contains(*key)) {
        Some(stale) => Err(PulsarError::UnknownPartition {
            key: role.option_key(),
            topic: stale.clone(),
        }),
        None => Ok(()),
    }
}

fn select(partition: &TopicPartition, spec: &OffsetSpec, role: OffsetRole) -> Result<SelectedBoundary> {
    let entries = match spec {
        OffsetSpec::Earliest | OffsetSpec::Latest => {
            return Ok(SelectedBoundary {
                boundary: spec.uniform().unwrap_or(role.default_boundary()),
                source: BoundarySource::Uniform,
            })
        }
        OffsetSpec::Specific(entries) => entries,
    };

    let name = partition.name();
    if let Some(boundary) = entries.get(&name) {
        return Ok(SelectedBoundary {
            boundary: *boundary,
            source: BoundarySource::Entry(name),
        });
    }

    if partition.index.is_some() {
        if let Some(boundary) = entries.get(&partition.topic) {
            if let MessageIdBoundary::Explicit(id) = boundary {
                return Err(PulsarError::InvalidMessageId {
                    partition: partition.topic.clone(),
                    id: id.to_string(),
                    reason: format!(
                        "{} of a partitioned topic must be keyed by partition name, e.g. {name}",
                        role.option_key()
                    ),
                });
            }
            return Ok(SelectedBoundary {
                boundary: *boundary,
                source: BoundarySource::Entry(partition.topic.clone()),
            });
        }
    }

    Ok(SelectedBoundary {
        boundary: role.default_boundary(),
        source: BoundarySource::Default,
    })
}

/// Turns offset options into concrete per-partition ranges.
#[derive(Debug, Clone, Copy)]
pub struct OffsetResolver {
    validator: RangeValidator,
    fail_on_data_loss: bool,
}

impl OffsetResolver {
    pub fn new(mode: ReadMode) -> Self {
        Self {
            validator: RangeValidator::new(mode),
            fail_on_data_loss: true,
        }
    }

    pub fn with_fail_on_data_loss(mut self, fail_on_data_loss: bool) -> Self {
        self.fail_on_data_loss = fail_on_data_loss;
        self
    }

    pub fn validator(&self) -> &RangeValidator {
        &self.validator
    }

    /// Selects, validates and resolves the ranges of `partitions`.
    ///
    /// Either every partition resolves or an error is returned.
    pub fn resolve(
        &self,
        partitions: &[TopicPartition],
        start: &OffsetSpec,
        end: &OffsetSpec,
        snapshot: &BrokerSnapshot,
    ) -> Result<ResolvedRanges> {
        let bounds = select_bounds(partitions, start, end)?;
        self.validator.validate(&bounds)?;
        self.resolve_bounds(&bounds, snapshot)
    }

    /// Resolves already selected and validated boundaries.
    pub fn resolve_bounds(
        &self,
        bounds: &[PartitionBounds],
        snapshot: &BrokerSnapshot,
    ) -> Result<ResolvedRanges> {
        bounds
            .iter()
            .map(|bound| {
                let partition = &bound.partition;
                let state = snapshot
                    .state(partition)
                    .ok_or_else(|| PulsarError::TopicNotFound(partition.name()))?;
                let range = ResolvedRange {
                    partition: partition.clone(),
                    start: self.resolve_boundary(
                        partition,
                        &bound.start,
                        state,
                        snapshot,
                        OffsetRole::Start,
                    )?,
                    end: self.resolve_boundary(partition, &bound.end, state, snapshot, OffsetRole::End)?,
                };
                log::debug!("Resolved {range}");
                Ok((partition.clone(), range))
            })
            .collect()
    }

    fn resolve_boundary(
        &self,
        partition: &TopicPartition,
        selected: &SelectedBoundary,
        state: &PartitionState,
        snapshot: &BrokerSnapshot,
        role: OffsetRole,
    ) -> Result<ResolvedBoundary> {
        let tag = selected.boundary.tag();
        let id = match selected.boundary {
            MessageIdBoundary::Earliest => state.earliest,
            MessageIdBoundary::Latest => state.latest,
            MessageIdBoundary::Explicit(id) => {
                self.check_explicit(partition, id, state, snapshot, role)?
            }
        };
        Ok(ResolvedBoundary { tag, id })
    }

    fn check_explicit(
        &self,
        partition: &TopicPartition,
        id: MessageId,
        state: &PartitionState,
        snapshot: &BrokerSnapshot,
        role: OffsetRole,
    ) -> Result<MessageId> {
        let invalid = |reason: String| PulsarError::InvalidMessageId {
            partition: partition.name(),
            id: id.to_string(),
            reason,
        };

        let expected = partition.message_partition()?;
        if id.partition != expected {
            return Err(invalid(format!(
                "it belongs to partition {} but {} has partition index {expected}",
                id.partition,
                partition.name(),
            )));
        }
        if state.retains(&id) {
            if snapshot.has_message(partition, &id) {
                return Ok(id);
            }
            return Err(invalid("no message with this id exists".to_string()));
        }
        if role == OffsetRole::Start && !self.fail_on_data_loss && id < state.earliest {
            log::warn!(
                "{} {id} of {partition} is no longer retained, reading from {} instead",
                role.option_key(),
                state.earliest
            );
            return Ok(state.earliest);
        }
        Err(invalid(if state.is_empty() {
            "the partition holds no messages".to_string()
        } else {
            format!(
                "retained messages span {} to {}",
                state.earliest, state.latest
            )
        }))
    }
}

/// Boundaries selected and validated at planning time, ready to be resolved
/// against the broker once per execution.
///
/// The partition set is fixed when the plan is built. Every call to
/// [`RangePlan::resolve`] captures a fresh snapshot, so `latest` boundaries
/// follow the tail of each partition from one execution to the next.
#[derive(Debug, Clone)]
pub struct RangePlan {
    bounds: Vec<PartitionBounds>,
    resolver: OffsetResolver,
}

impl RangePlan {
    /// Selects and validates the boundaries of `partitions`. No broker I/O
    /// happens here.
    pub fn try_new(
        resolver: OffsetResolver,
        partitions: &[TopicPartition],
        start: &OffsetSpec,
        end: &OffsetSpec,
    ) -> Result<Self> {
        let bounds = select_bounds(partitions, start, end)?;
        resolver.validator().validate(&bounds)?;
        Ok(Self { bounds, resolver })
    }

    pub fn bounds(&self) -> &[PartitionBounds] {
        &self.bounds
    }

    pub fn partitions(&self) -> Vec<TopicPartition> {
        self.bounds
            .iter()
            .map(|bound| bound.partition.clone())
            .collect()
    }

    /// Every explicit id of the plan with the partition it applies to.
    pub fn explicit_ids(&self) -> Vec<(TopicPartition, MessageId)> {
        let ids: BTreeSet<_> = self
            .bounds
            .iter()
            .flat_map(|bound| {
                [bound.start.boundary, bound.end.boundary]
                    .into_iter()
                    .filter_map(move |boundary| match boundary {
                        MessageIdBoundary::Explicit(id) => Some((bound.partition.clone(), id)),
                        _ => None,
                    })
            })
            .collect();
        ids.into_iter().collect()
    }

    pub fn resolve_with(&self, snapshot: &BrokerSnapshot) -> Result<ResolvedRanges> {
        self.resolver.resolve_bounds(&self.bounds, snapshot)
    }

    /// Captures the current broker state, looks up the plan's explicit ids,
    /// and resolves every range against the result.
    pub async fn resolve(&self, catalog: &dyn PulsarCatalog) -> Result<ResolvedRanges> {
        let snapshot = BrokerSnapshot::capture(catalog, &self.partitions())
            .await?
            .confirm_messages(catalog, &self.explicit_ids())
            .await?;
        self.resolve_with(&snapshot)
    }
}
