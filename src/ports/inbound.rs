//! # Inbound Ports
//!
//! What the routing core offers to callers.

use crate::domain::{RouteQuery, RouteResult, ShardingError};

/// Query routing - inbound port.
pub trait QueryRouter: Send + Sync {
    /// Compute the minimal set of physical targets guaranteed to contain
    /// every row matching the query.
    fn route(&self, query: &RouteQuery) -> Result<RouteResult, ShardingError>;

    /// All targets an unrestricted scan of one entity touches.
    fn route_full_scan(&self, entity: &str) -> Result<RouteResult, ShardingError> {
        self.route(&RouteQuery::full_scan(entity))
    }
}
