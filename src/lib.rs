//! # Shardmerge
//!
//! Transparent horizontal sharding: route queries to the physical
//! shards that can hold matching rows, fan units of work out across
//! them, and merge the per-shard partials back into one logical result.
//!
//! ## Purpose
//!
//! A query layer hands this crate an entity set plus a shard-key
//! condition and gets back a routed target set and a merged result:
//! - Route rule engine: per-entity candidate pruning, cross-entity
//!   intersection, conservative inclusion under opaque predicates
//! - Parallel execution controller: bounded fan-out, fail-fast or
//!   partial-tolerant gathering, cooperative cancellation
//! - Merge engine family: buffered ordered rows, streaming pass-through,
//!   scalar aggregates, cross-shard pagination
//! - Target registry: data source and table-tail topology with a single
//!   default data source
//!
//! ## Module Structure
//!
//! ```text
//! shardmerge/
//! ├── domain/          # Core types: PhysicalTarget, ShardValue, errors
//! ├── algorithms/      # Route rules, aggregate combinators, pagination
//! ├── executor/        # Parallel fan-out controller + cancellation
//! ├── merge/           # Merge strategies + merge session
//! ├── ports/           # API traits + dependency traits
//! └── adapters/        # Registry, metadata, shard routes, shard store
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod executor;
pub mod merge;
pub mod ports;

// Re-exports
pub use algorithms::{
    combine_average, max_value, min_value, sum_values, trim_to_window, PageWindow,
    RouteRuleEngine,
};
pub use domain::{
    invariant_conservative_inclusion, invariant_deterministic_routing,
    invariant_intersection_subset, invariant_no_unit_in_flight, invariant_partition_average,
    ConnectionMode, EntityMetadata, FailurePolicy, KeyPredicate, MergePhase, PartialResult,
    PhysicalTarget, RouteCondition, RouteQuery, RouteResult, ShardValue, ShardingCapability,
    ShardingError, DEFAULT_CACHE_WAIT_MS, DEFAULT_MAX_IN_FLIGHT,
};
pub use executor::{
    CancelSignal, CancelSource, ExecutionOutcome, ExecutionPolicy, ParallelExecutor,
    TargetFailure,
};
pub use merge::{
    AggregateMergeEngine, BufferedRows, InMemoryMergeEngine, Merged, MergedStream, MergeSession,
    OrderSpec, Page, PagedMergeEngine, StreamingMergeEngine, TargetContribution,
};
pub use ports::{
    ExecutionUnit, MetadataProvider, PageUnit, QueryRouter, RowSink, RowStreamUnit, ShardRoute,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
