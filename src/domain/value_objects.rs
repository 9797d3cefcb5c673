//! # Domain Value Objects
//!
//! Immutable value types shared by routing, execution and merging.

use super::errors::{DataSourceName, TableTail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One executable unit: a data source plus a table tail.
///
/// The tail is empty for tables that are not table-sharded; the pair is
/// immutable once created and owned by the registry, route results only
/// reference it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicalTarget {
    data_source: DataSourceName,
    tail: TableTail,
}

impl PhysicalTarget {
    /// Create a target from a data source name and a table tail.
    pub fn new(data_source: impl Into<DataSourceName>, tail: impl Into<TableTail>) -> Self {
        Self {
            data_source: data_source.into(),
            tail: tail.into(),
        }
    }

    /// Target in a data source with no table sharding.
    pub fn data_source_only(data_source: impl Into<DataSourceName>) -> Self {
        Self::new(data_source, "")
    }

    /// Data source name.
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Table tail; empty when the table is not sharded.
    pub fn tail(&self) -> &str {
        &self.tail
    }
}

impl fmt::Display for PhysicalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tail.is_empty() {
            write!(f, "{}", self.data_source)
        } else {
            write!(f, "{}.{}", self.data_source, self.tail)
        }
    }
}

/// Shard key value. A closed set of variants stands in for the dynamic
/// key value of the virtual schema; `Null` exists only so routing can
/// fail fast on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardValue {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
    /// Absent key. Routing on this is always an error.
    Null,
}

impl fmt::Display for ShardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Null => write!(f, "<null>"),
        }
    }
}

impl From<i64> for ShardValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ShardValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Predicate over the shard key. Routes include a target unless the
/// predicate is provably false for every value reachable under it, so
/// unsupported shapes degrade to a full candidate scan, never to a
/// dropped target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPredicate {
    /// Key equals a value.
    Eq(ShardValue),
    /// Key is one of the listed values.
    In(Vec<ShardValue>),
    /// Key lies in an inclusive range (open ends allowed).
    Range {
        /// Inclusive lower bound.
        min: Option<ShardValue>,
        /// Inclusive upper bound.
        max: Option<ShardValue>,
    },
}

/// The single active routing condition of a logical query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteCondition {
    /// Exact shard key value; maps to exactly one target per entity.
    Value(ShardValue),
    /// Predicate over the shard key; conservative candidate inclusion.
    Predicate(KeyPredicate),
    /// No restriction; every known target per entity.
    FullScan,
}

/// Connection discipline for a fan-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// One connection, units execute one at a time. Used for
    /// single-target queries that may reuse a connection.
    Sequential,
    /// Independent connections, bounded N-way concurrent fan-out.
    Scatter,
}

/// What a per-target failure does to the whole query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// First failure cancels all in-flight siblings and fails the query.
    FailFast,
    /// Failures are recorded and excluded; the result is flagged partial.
    PartialTolerant,
}

/// Merge session state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MergePhase {
    /// Nothing dispatched yet.
    #[default]
    Idle,
    /// Targets chosen, units launched.
    Dispatching,
    /// Partials arriving.
    Collecting,
    /// Combinator applied.
    Reducing,
    /// Terminal: merge finished.
    Complete,
    /// Terminal: fail-fast failure while collecting.
    Failed,
    /// Terminal: the caller withdrew the query before the merge settled.
    Cancelled,
}

impl MergePhase {
    /// Check whether a transition to `next` is valid.
    pub fn can_transition_to(&self, next: MergePhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Dispatching)
                | (Self::Dispatching, Self::Collecting)
                | (Self::Dispatching, Self::Complete)
                | (Self::Collecting, Self::Reducing)
                | (Self::Collecting, Self::Failed)
                | (Self::Collecting, Self::Cancelled)
                | (Self::Reducing, Self::Complete)
        )
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
