//! Offset-range resolution.
//!
//! * [`spec`] - parsing of the offsets options into an [`OffsetSpec`]
//! * [`resolver`] - per-partition boundary selection and late-bound resolution
//! * [`validator`] - direction rules for batch reads

pub mod resolver;
pub mod spec;
pub mod validator;

pub use resolver::{
    select_bounds, BoundarySource, OffsetResolver, PartitionBounds, RangePlan, SelectedBoundary,
};
pub use spec::{OffsetRole, OffsetSpec};
pub use validator::RangeValidator;
