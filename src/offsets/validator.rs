//! Batch direction rules for offset boundaries.

use crate::error::{PulsarError, Result};
use crate::offsets::resolver::{BoundarySource, PartitionBounds, SelectedBoundary};
use crate::offsets::spec::OffsetSpec;
use crate::types::{MessageIdBoundary, ReadMode};

/// Enforces the direction rules of bounded reads.
///
/// A batch query may not start at `latest` (it would read nothing, or
/// whatever happens to arrive while it runs) nor end at `earliest`. The check
/// looks at the boundary *tag*, never at a resolved identifier. Streaming
/// reads are not restricted.
#[derive(Debug, Clone, Copy)]
pub struct RangeValidator {
    mode: ReadMode,
}

impl RangeValidator {
    pub fn new(mode: ReadMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Checks the uniform keyword forms before anything is looked up on the
    /// broker. Per-topic entries are checked by [`RangeValidator::validate`]
    /// once it is known which entry each partition uses.
    pub fn validate_specs(&self, start: &OffsetSpec, end: &OffsetSpec) -> Result<()> {
        if self.mode != ReadMode::Batch {
            return Ok(());
        }
        if matches!(start, OffsetSpec::Latest) {
            return Err(PulsarError::StartingOffsetLatest { topic: None });
        }
        if matches!(end, OffsetSpec::Earliest) {
            return Err(PulsarError::EndingOffsetEarliest { topic: None });
        }
        Ok(())
    }

    /// Checks the boundaries selected for each partition.
    pub fn validate(&self, bounds: &[PartitionBounds]) -> Result<()> {
        if self.mode != ReadMode::Batch {
            return Ok(());
        }
        for bound in bounds {
            if bound.start.boundary == MessageIdBoundary::Latest {
                return Err(PulsarError::StartingOffsetLatest {
                    topic: offending_topic(&bound.start),
                });
            }
            if bound.end.boundary == MessageIdBoundary::Earliest {
                return Err(PulsarError::EndingOffsetEarliest {
                    topic: offending_topic(&bound.end),
                });
            }
        }
        Ok(())
    }
}

fn offending_topic(selected: &SelectedBoundary) -> Option<String> {
    match &selected.source {
        BoundarySource::Entry(topic) => Some(topic.clone()),
        BoundarySource::Uniform | BoundarySource::Default => None,
    }
}
