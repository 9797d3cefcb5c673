//! # Route Rule Engine
//!
//! Computes the minimal set of physical targets guaranteed to contain
//! every row matching a logical query: per-entity candidate sets, unioned
//! per entity, intersected across entities.

use crate::adapters::target_registry::TargetRegistry;
use crate::domain::{
    invariant_intersection_subset, PhysicalTarget, RouteCondition, RouteQuery, RouteResult,
    ShardValue, ShardingError, TableTail,
};
use crate::ports::inbound::QueryRouter;
use crate::ports::outbound::{MetadataProvider, ShardRoute};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The route rule engine. One per virtual schema; safe for concurrent
/// routing.
pub struct RouteRuleEngine {
    registry: Arc<TargetRegistry>,
    metadata: Arc<dyn MetadataProvider>,
    data_source_routes: RwLock<HashMap<String, Arc<dyn ShardRoute>>>,
    table_routes: RwLock<HashMap<String, Arc<dyn ShardRoute>>>,
}

impl RouteRuleEngine {
    /// Create an engine over a registry and a metadata provider.
    pub fn new(registry: Arc<TargetRegistry>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            registry,
            metadata,
            data_source_routes: RwLock::new(HashMap::new()),
            table_routes: RwLock::new(HashMap::new()),
        }
    }

    /// Bind an entity's data-source shard route.
    pub fn bind_data_source_route(&self, entity: impl Into<String>, route: Arc<dyn ShardRoute>) {
        self.data_source_routes.write().insert(entity.into(), route);
    }

    /// Bind an entity's table shard route.
    pub fn bind_table_route(&self, entity: impl Into<String>, route: Arc<dyn ShardRoute>) {
        self.table_routes.write().insert(entity.into(), route);
    }

    /// Candidate targets for one entity under the query's condition.
    fn targets_for(
        &self,
        entity: &str,
        condition: &RouteCondition,
    ) -> Result<RouteResult, ShardingError> {
        let capability = self.metadata.capability(entity);
        if !capability.is_sharding() {
            let default = self.registry.default_data_source_name()?;
            return Ok(RouteResult::new([PhysicalTarget::data_source_only(
                default,
            )]));
        }

        // Unrestricted scans come straight from the registry's memoized
        // candidate lists.
        if matches!(condition, RouteCondition::FullScan) {
            let cached = self.registry.candidate_targets(entity, capability)?;
            return Ok(RouteResult::new(cached.iter().cloned()));
        }

        let data_sources = if capability.shards_data_source() {
            let route = self.data_source_route(entity)?;
            self.evaluate(entity, condition, route.as_ref(), &self.registry.all_data_source_names())?
        } else {
            vec![self.registry.default_data_source_name()?]
        };
        let tails = if capability.shards_table() {
            let route = self.table_route(entity)?;
            self.evaluate(entity, condition, route.as_ref(), &self.registry.tails_for(entity))?
        } else {
            vec![TableTail::new()]
        };

        // Topology check: every routed data source must be registered.
        for name in &data_sources {
            self.registry.resolve(name)?;
        }

        let mut targets = Vec::with_capacity(data_sources.len() * tails.len());
        for data_source in &data_sources {
            for tail in &tails {
                targets.push(PhysicalTarget::new(data_source.clone(), tail.clone()));
            }
        }
        Ok(RouteResult::new(targets))
    }

    /// Evaluate the condition against one sharding dimension.
    fn evaluate(
        &self,
        entity: &str,
        condition: &RouteCondition,
        route: &dyn ShardRoute,
        candidates: &[String],
    ) -> Result<Vec<String>, ShardingError> {
        match condition {
            RouteCondition::Value(ShardValue::Null) => {
                // A null key is a caller bug; never degrade to a scan.
                Err(ShardingError::MissingShardKeyValue(entity.to_string()))
            }
            RouteCondition::Value(value) => Ok(vec![route.route_value(value)?]),
            RouteCondition::Predicate(predicate) => {
                Ok(route.route_predicate(predicate, candidates))
            }
            RouteCondition::FullScan => Ok(candidates.to_vec()),
        }
    }

    fn data_source_route(&self, entity: &str) -> Result<Arc<dyn ShardRoute>, ShardingError> {
        self.data_source_routes
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| ShardingError::MissingRouteMetadata(entity.to_string()))
    }

    fn table_route(&self, entity: &str) -> Result<Arc<dyn ShardRoute>, ShardingError> {
        self.table_routes
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| ShardingError::MissingRouteMetadata(entity.to_string()))
    }
}

impl QueryRouter for RouteRuleEngine {
    fn route(&self, query: &RouteQuery) -> Result<RouteResult, ShardingError> {
        if query.entities.is_empty() {
            return Err(ShardingError::NoQueryEntities);
        }

        // Union per entity: the same entity referenced twice widens its
        // own set, never another entity's.
        let mut per_entity: HashMap<String, RouteResult> = HashMap::new();
        for entity in &query.entities {
            let targets = self.targets_for(entity, &query.condition)?;
            match per_entity.get_mut(entity) {
                Some(existing) => {
                    let merged = existing
                        .targets()
                        .iter()
                        .cloned()
                        .chain(targets.targets().iter().cloned());
                    *existing = RouteResult::new(merged);
                }
                None => {
                    per_entity.insert(entity.clone(), targets);
                }
            }
        }

        let sets: Vec<RouteResult> = per_entity.values().cloned().collect();
        let result = if sets.len() == 1 {
            sets[0].clone()
        } else {
            let mut iter = sets.iter();
            let first = iter.next().cloned().unwrap_or_default();
            iter.fold(first, |acc, set| acc.intersect(set))
        };

        if result.is_empty() {
            let mut entities: Vec<_> = per_entity.keys().cloned().collect();
            entities.sort();
            return Err(ShardingError::RouteContradiction {
                entities: entities.join(", "),
            });
        }
        debug_assert!(invariant_intersection_subset(&result, &sets).is_ok());
        debug!(
            "[shardmerge] routed {} entities to {} targets",
            per_entity.len(),
            result.len()
        );
        Ok(result)
    }
}
