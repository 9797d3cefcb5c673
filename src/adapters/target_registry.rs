//! # Physical Target Registry
//!
//! Holds the known data sources and per-entity table tails, resolves
//! logical names to connection targets, and memoizes per-entity full-scan
//! candidate lists behind a bounded-wait cache.

use crate::domain::{
    DataSourceName, EntityName, PhysicalTarget, ShardingCapability, ShardingError, TableTail,
    DEFAULT_CACHE_WAIT_MS,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One registered physical data source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicDataSource {
    /// Logical name used by routing.
    pub name: DataSourceName,
    /// Connection target for the execution-unit factory.
    pub connection_string: String,
    /// Exactly one data source may be default.
    pub is_default: bool,
}

impl PhysicDataSource {
    /// Create a non-default data source.
    pub fn new(name: impl Into<DataSourceName>, connection_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            is_default: false,
        }
    }

    /// Create the default data source.
    pub fn default_source(
        name: impl Into<DataSourceName>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            is_default: true,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    data_sources: HashMap<DataSourceName, PhysicDataSource>,
    default_name: Option<DataSourceName>,
    tails: HashMap<EntityName, BTreeSet<TableTail>>,
}

/// Registry of physical targets. Read-mostly; registration happens at
/// startup or rarely at runtime.
pub struct TargetRegistry {
    inner: RwLock<RegistryInner>,
    candidate_cache: Mutex<HashMap<EntityName, Arc<Vec<PhysicalTarget>>>>,
    cache_wait: Duration,
}

impl TargetRegistry {
    /// Registry with the default cache wait bound.
    pub fn new() -> Self {
        Self::with_cache_wait(Duration::from_millis(DEFAULT_CACHE_WAIT_MS))
    }

    /// Registry with an explicit bound on candidate-cache lock waits.
    pub fn with_cache_wait(cache_wait: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            candidate_cache: Mutex::new(HashMap::new()),
            cache_wait,
        }
    }

    /// Register a data source.
    ///
    /// Returns `Ok(false)` when the name is already registered (the
    /// existing registration wins). Registering a second default is a
    /// fatal configuration error and leaves the first default unchanged.
    pub fn register_data_source(&self, source: PhysicDataSource) -> Result<bool, ShardingError> {
        {
            let mut inner = self.inner.write();
            if source.is_default {
                if let Some(existing) = &inner.default_name {
                    if *existing != source.name {
                        return Err(ShardingError::DuplicateDefaultDataSource {
                            existing: existing.clone(),
                            attempted: source.name,
                        });
                    }
                }
            }
            if inner.data_sources.contains_key(&source.name) {
                return Ok(false);
            }
            info!(
                "[shardmerge] registered data source [{}] default={}",
                source.name, source.is_default
            );
            if source.is_default {
                inner.default_name = Some(source.name.clone());
            }
            inner.data_sources.insert(source.name.clone(), source);
        }
        self.invalidate_cache()?;
        Ok(true)
    }

    /// Register a table tail for an entity. Returns false when the tail
    /// was already known.
    pub fn register_tail(
        &self,
        entity: impl Into<EntityName>,
        tail: impl Into<TableTail>,
    ) -> Result<bool, ShardingError> {
        let added = {
            let mut inner = self.inner.write();
            inner
                .tails
                .entry(entity.into())
                .or_default()
                .insert(tail.into())
        };
        if added {
            self.invalidate_cache()?;
        }
        Ok(added)
    }

    /// Resolve a data source name to its registration.
    pub fn resolve(&self, name: &str) -> Result<PhysicDataSource, ShardingError> {
        self.inner
            .read()
            .data_sources
            .get(name)
            .cloned()
            .ok_or_else(|| ShardingError::TargetNotFound(name.to_string()))
    }

    /// The default data source.
    pub fn default_data_source(&self) -> Result<PhysicDataSource, ShardingError> {
        let name = self.default_data_source_name()?;
        self.resolve(&name)
    }

    /// Name of the default data source.
    pub fn default_data_source_name(&self) -> Result<DataSourceName, ShardingError> {
        self.inner
            .read()
            .default_name
            .clone()
            .ok_or(ShardingError::MissingDefaultDataSource)
    }

    /// All registered data source names, sorted.
    pub fn all_data_source_names(&self) -> Vec<DataSourceName> {
        let mut names: Vec<_> = self.inner.read().data_sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Table tails registered for an entity, sorted. Entities without
    /// table sharding get the empty-tail sentinel.
    pub fn tails_for(&self, entity: &str) -> Vec<TableTail> {
        let inner = self.inner.read();
        match inner.tails.get(entity) {
            Some(tails) if !tails.is_empty() => tails.iter().cloned().collect(),
            _ => vec![TableTail::new()],
        }
    }

    /// Full-scan candidate targets for an entity, memoized.
    ///
    /// Read-through cache behind a single mutex with a bounded wait;
    /// exceeding the bound fails with `LockTimeout` rather than blocking
    /// the query indefinitely.
    pub fn candidate_targets(
        &self,
        entity: &str,
        capability: ShardingCapability,
    ) -> Result<Arc<Vec<PhysicalTarget>>, ShardingError> {
        let mut cache =
            self.candidate_cache
                .try_lock_for(self.cache_wait)
                .ok_or(ShardingError::LockTimeout {
                    waited_ms: self.cache_wait.as_millis() as u64,
                })?;
        if let Some(hit) = cache.get(entity) {
            return Ok(Arc::clone(hit));
        }

        let data_sources = if capability.shards_data_source() {
            self.all_data_source_names()
        } else {
            vec![self.default_data_source_name()?]
        };
        let tails = if capability.shards_table() {
            self.tails_for(entity)
        } else {
            vec![TableTail::new()]
        };

        let mut targets = Vec::with_capacity(data_sources.len() * tails.len());
        for data_source in &data_sources {
            for tail in &tails {
                targets.push(PhysicalTarget::new(data_source.clone(), tail.clone()));
            }
        }
        debug!(
            "[shardmerge] cached {} candidate targets for entity [{}]",
            targets.len(),
            entity
        );
        let targets = Arc::new(targets);
        cache.insert(entity.to_string(), Arc::clone(&targets));
        Ok(targets)
    }

    fn invalidate_cache(&self) -> Result<(), ShardingError> {
        let mut cache =
            self.candidate_cache
                .try_lock_for(self.cache_wait)
                .ok_or(ShardingError::LockTimeout {
                    waited_ms: self.cache_wait.as_millis() as u64,
                })?;
        cache.clear();
        Ok(())
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
