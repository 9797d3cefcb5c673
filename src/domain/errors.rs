//! # Domain Errors
//!
//! Error taxonomy for routing and merge execution.

use thiserror::Error;

/// Logical name of a physical data source.
pub type DataSourceName = String;

/// Table-name suffix identifying one physical table within a data source.
/// Empty for unsharded tables.
pub type TableTail = String;

/// Logical entity name as registered in the metadata provider.
pub type EntityName = String;

/// Sharding error types.
#[derive(Debug, Error)]
pub enum ShardingError {
    /// A second default data source was registered. Fatal configuration
    /// error; the first default stays in effect.
    #[error("default data source already registered: existing [{existing}], attempted [{attempted}]")]
    DuplicateDefaultDataSource {
        /// Name of the data source already marked default.
        existing: DataSourceName,
        /// Name of the rejected registration.
        attempted: DataSourceName,
    },

    /// No default data source has been registered yet.
    #[error("no default data source registered")]
    MissingDefaultDataSource,

    /// Routing metadata missing for a sharded entity.
    #[error("missing route metadata for entity [{0}]")]
    MissingRouteMetadata(EntityName),

    /// The per-entity candidate sets have an empty intersection; the query
    /// cannot be satisfied. Not retryable.
    #[error("route contradiction: no physical target satisfies all entities [{entities}]")]
    RouteContradiction {
        /// Entities whose candidate sets were intersected.
        entities: String,
    },

    /// The query referenced no entities at all.
    #[error("query references no entities")]
    NoQueryEntities,

    /// Resolving an unregistered data source name.
    #[error("data source not found: [{0}]")]
    TargetNotFound(DataSourceName),

    /// An exact-value route was requested but the shard key value is null.
    /// Failing fast here avoids masking a caller bug as a full-cluster scan.
    #[error("shard key value missing for entity [{0}]")]
    MissingShardKeyValue(EntityName),

    /// A shard key value the route has no mapping for.
    #[error("no target mapped for shard key value [{value}] of entity [{entity}]")]
    UnmappedShardKeyValue {
        /// Entity being routed.
        entity: EntityName,
        /// Display form of the offending value.
        value: String,
    },

    /// Per-target execution failure, recovered per the failure policy.
    #[error("execution failed on target [{target}]: {reason}")]
    Execution {
        /// Display form of the physical target.
        target: String,
        /// Underlying failure description.
        reason: String,
    },

    /// Cooperative cancellation. Distinct from failure; resources are
    /// released identically to the failure path.
    #[error("query cancelled")]
    Cancelled,

    /// Bounded wait on the registry candidate cache expired.
    #[error("candidate cache lock not acquired within {waited_ms}ms")]
    LockTimeout {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// Invalid merge-session phase transition.
    #[error("invalid merge phase transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase.
        from: String,
        /// Attempted phase.
        to: String,
    },
}
