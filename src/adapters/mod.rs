//! # Adapters
//!
//! Concrete implementations of the ports: an in-memory metadata
//! provider, lookup and hash shard routes, the physical target registry,
//! and an in-memory shard store with execution units for tests and
//! demos.

pub mod execution;
pub mod metadata;
pub mod shard_route;
pub mod target_registry;

pub use execution::{CountUnit, FetchUnit, InMemoryShardStore, PagedFetchUnit, StreamUnit};
pub use metadata::InMemoryMetadataProvider;
pub use shard_route::{HashShardRoute, LookupShardRoute};
pub use target_registry::{PhysicDataSource, TargetRegistry};
