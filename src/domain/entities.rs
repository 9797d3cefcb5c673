//! # Domain Entities
//!
//! Entity sharding metadata, route results and per-target partials.

use super::errors::EntityName;
use super::value_objects::{PhysicalTarget, RouteCondition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which sharding dimensions an entity participates in.
///
/// A closed tag dispatched on by the route rule engine; replaces runtime
/// type inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardingCapability {
    /// Entity lives entirely in the default data source, one table.
    None,
    /// Rows are spread across data sources.
    DataSource,
    /// Rows are spread across table tails within one data source.
    Table,
    /// Sharded on both dimensions.
    Both,
}

impl ShardingCapability {
    /// Entity participates in data-source sharding.
    pub fn shards_data_source(&self) -> bool {
        matches!(self, Self::DataSource | Self::Both)
    }

    /// Entity participates in table sharding.
    pub fn shards_table(&self) -> bool {
        matches!(self, Self::Table | Self::Both)
    }

    /// Entity participates in sharding at all.
    pub fn is_sharding(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Per-entity sharding metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Logical entity name.
    pub entity: EntityName,
    /// Sharding dimensions the entity participates in.
    pub capability: ShardingCapability,
    /// Property used for data-source sharding, if any.
    pub data_source_property: Option<String>,
    /// Property used for table sharding, if any.
    pub table_property: Option<String>,
    /// More than one physical data source can hold rows for a key.
    pub multi_data_source: bool,
    /// More than one table tail can hold rows for a key.
    pub multi_table: bool,
    /// The entity has a single-column primary key.
    pub single_key: bool,
    /// Primary key property name.
    pub primary_key: String,
}

impl EntityMetadata {
    /// The data-source shard key is the primary key.
    ///
    /// Single-key entities with a non-multi mapping qualify by
    /// construction; otherwise the property names are compared.
    pub fn data_source_key_is_primary(&self) -> bool {
        if !self.multi_data_source && self.single_key {
            return true;
        }
        self.data_source_property.as_deref() == Some(self.primary_key.as_str())
    }

    /// The table shard key is the primary key.
    pub fn table_key_is_primary(&self) -> bool {
        if !self.multi_table && self.single_key {
            return true;
        }
        self.table_property.as_deref() == Some(self.primary_key.as_str())
    }
}

/// A logical query as seen by the route rule engine: the entities it
/// touches plus exactly one active routing condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteQuery {
    /// Entities referenced by the query, duplicates allowed.
    pub entities: Vec<EntityName>,
    /// The single active condition.
    pub condition: RouteCondition,
}

impl RouteQuery {
    /// Query over one entity.
    pub fn single(entity: impl Into<EntityName>, condition: RouteCondition) -> Self {
        Self {
            entities: vec![entity.into()],
            condition,
        }
    }

    /// Unrestricted scan over one entity.
    pub fn full_scan(entity: impl Into<EntityName>) -> Self {
        Self::single(entity, RouteCondition::FullScan)
    }
}

/// Deduplicated set of physical targets attributed to one logical query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    targets: HashSet<PhysicalTarget>,
}

impl RouteResult {
    /// Build from any collection of targets.
    pub fn new(targets: impl IntoIterator<Item = PhysicalTarget>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }

    /// Number of distinct targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when no target matched.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, target: &PhysicalTarget) -> bool {
        self.targets.contains(target)
    }

    /// Unordered view of the targets.
    pub fn targets(&self) -> &HashSet<PhysicalTarget> {
        &self.targets
    }

    /// Targets in deterministic (sorted) order, for dispatch and tests.
    pub fn sorted(&self) -> Vec<PhysicalTarget> {
        let mut out: Vec<_> = self.targets.iter().cloned().collect();
        out.sort();
        out
    }

    /// Set intersection with another result.
    pub fn intersect(&self, other: &RouteResult) -> RouteResult {
        RouteResult {
            targets: self.targets.intersection(&other.targets).cloned().collect(),
        }
    }
}

impl FromIterator<PhysicalTarget> for RouteResult {
    fn from_iter<I: IntoIterator<Item = PhysicalTarget>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// One target's contribution to a merge: created once per completed
/// execution unit, consumed exactly once by a merge strategy.
#[derive(Clone, Debug)]
pub struct PartialResult<T> {
    target: PhysicalTarget,
    value: T,
}

impl<T> PartialResult<T> {
    /// Attribute a value to the target that produced it.
    pub fn new(target: PhysicalTarget, value: T) -> Self {
        Self { target, value }
    }

    /// Producing target.
    pub fn target(&self) -> &PhysicalTarget {
        &self.target
    }

    /// Data source the value came from.
    pub fn data_source(&self) -> &str {
        self.target.data_source()
    }

    /// Borrow the value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume into the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Consume into target and value.
    pub fn into_parts(self) -> (PhysicalTarget, T) {
        (self.target, self.value)
    }
}
