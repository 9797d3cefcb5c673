//! # Domain Layer
//!
//! Core types for shard routing and result merging.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod value_objects;

pub use entities::{
    EntityMetadata, PartialResult, RouteQuery, RouteResult, ShardingCapability,
};
pub use errors::{DataSourceName, EntityName, ShardingError, TableTail};
pub use invariants::{
    invariant_conservative_inclusion, invariant_deterministic_routing,
    invariant_intersection_subset, invariant_no_unit_in_flight, invariant_partition_average,
    DEFAULT_CACHE_WAIT_MS, DEFAULT_MAX_IN_FLIGHT,
};
pub use value_objects::{
    ConnectionMode, FailurePolicy, KeyPredicate, MergePhase, PhysicalTarget, RouteCondition,
    ShardValue,
};
