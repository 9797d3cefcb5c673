//! # In-Memory Shard Store
//!
//! A per-target row store plus execution units over it. Stands in for the
//! real storage adapter in tests and demos; the merge engines only ever
//! see the unit traits.

use crate::algorithms::pagination::{trim_to_window, PageWindow};
use crate::domain::{PhysicalTarget, ShardingError};
use crate::executor::CancelSignal;
use crate::ports::outbound::{ExecutionUnit, PageUnit, RowSink, RowStreamUnit};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Rows held per physical target.
pub struct InMemoryShardStore<T> {
    rows: RwLock<HashMap<PhysicalTarget, Vec<T>>>,
}

impl<T: Clone> InMemoryShardStore<T> {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Append one row to a target's partition.
    pub fn insert(&self, target: &PhysicalTarget, row: T) {
        self.rows
            .write()
            .entry(target.clone())
            .or_default()
            .push(row);
    }

    /// Replace a target's partition wholesale.
    pub fn load(&self, target: &PhysicalTarget, rows: Vec<T>) {
        self.rows.write().insert(target.clone(), rows);
    }

    /// Snapshot of one target's rows.
    pub fn rows_for(&self, target: &PhysicalTarget) -> Vec<T> {
        self.rows.read().get(target).cloned().unwrap_or_default()
    }
}

impl<T: Clone> Default for InMemoryShardStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches a target's full partition.
pub struct FetchUnit<T> {
    store: Arc<InMemoryShardStore<T>>,
}

impl<T: Clone> FetchUnit<T> {
    /// Unit over a shared store.
    pub fn new(store: Arc<InMemoryShardStore<T>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ExecutionUnit<Vec<T>> for FetchUnit<T> {
    async fn run(
        &self,
        target: &PhysicalTarget,
        _cancel: CancelSignal,
    ) -> Result<Vec<T>, ShardingError> {
        Ok(self.store.rows_for(target))
    }
}

/// Counts a target's partition.
pub struct CountUnit<T> {
    store: Arc<InMemoryShardStore<T>>,
}

impl<T: Clone> CountUnit<T> {
    /// Unit over a shared store.
    pub fn new(store: Arc<InMemoryShardStore<T>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ExecutionUnit<u64> for CountUnit<T> {
    async fn run(
        &self,
        target: &PhysicalTarget,
        _cancel: CancelSignal,
    ) -> Result<u64, ShardingError> {
        Ok(self.store.rows_for(target).len() as u64)
    }
}

/// Streams a target's partition row by row.
pub struct StreamUnit<T> {
    store: Arc<InMemoryShardStore<T>>,
}

impl<T: Clone> StreamUnit<T> {
    /// Unit over a shared store.
    pub fn new(store: Arc<InMemoryShardStore<T>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> RowStreamUnit<T> for StreamUnit<T> {
    async fn stream(
        &self,
        target: &PhysicalTarget,
        sink: RowSink<T>,
        cancel: CancelSignal,
    ) -> Result<(), ShardingError> {
        for row in self.store.rows_for(target) {
            if cancel.is_cancelled() {
                return Err(ShardingError::Cancelled);
            }
            if !sink.send(row).await {
                break;
            }
        }
        Ok(())
    }
}

/// Windowed fetch over a target's partition in local order.
///
/// Rows are served in the partition's stored order; the caller's
/// ordering key must agree with it for pagination to hold.
pub struct PagedFetchUnit<T> {
    store: Arc<InMemoryShardStore<T>>,
}

impl<T: Clone> PagedFetchUnit<T> {
    /// Unit over a shared store.
    pub fn new(store: Arc<InMemoryShardStore<T>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> PageUnit<T> for PagedFetchUnit<T> {
    async fn fetch(
        &self,
        target: &PhysicalTarget,
        window: PageWindow,
        _cancel: CancelSignal,
    ) -> Result<Vec<T>, ShardingError> {
        Ok(trim_to_window(self.store.rows_for(target), window))
    }
}
