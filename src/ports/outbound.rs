//! # Outbound Ports
//!
//! Traits for the collaborators the core depends on: entity metadata,
//! shard-key-to-target mappings, and the per-target execution units
//! supplied by the surrounding query layer.

use crate::algorithms::pagination::PageWindow;
use crate::domain::{
    EntityMetadata, KeyPredicate, PhysicalTarget, ShardValue, ShardingCapability, ShardingError,
};
use crate::executor::CancelSignal;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Entity sharding metadata - outbound port.
pub trait MetadataProvider: Send + Sync {
    /// Metadata for an entity, if it is registered.
    fn metadata(&self, entity: &str) -> Option<EntityMetadata>;

    /// Capability tag for an entity. Unregistered entities do not
    /// participate in sharding.
    fn capability(&self, entity: &str) -> ShardingCapability {
        self.metadata(entity)
            .map(|m| m.capability)
            .unwrap_or(ShardingCapability::None)
    }
}

/// Shard-key-to-target mapping - outbound port.
///
/// One instance per entity per sharding dimension. For the data-source
/// dimension the returned names are data source names; for the table
/// dimension they are table tails.
pub trait ShardRoute: Send + Sync {
    /// Map an exact key value to exactly one target name.
    fn route_value(&self, value: &ShardValue) -> Result<String, ShardingError>;

    /// Candidate names for a predicate. Conservative by contract: a name
    /// may be dropped only when the predicate is provably false for every
    /// value reachable under it. The default keeps every candidate.
    fn route_predicate(&self, predicate: &KeyPredicate, candidates: &[String]) -> Vec<String> {
        let _ = predicate;
        candidates.to_vec()
    }
}

/// One unit of work against one physical target - outbound port.
///
/// Supplied by the surrounding query layer; the routing/merge core treats
/// the produced value as opaque.
#[async_trait]
pub trait ExecutionUnit<T>: Send + Sync {
    /// Execute against the target. The cancel signal must be observed at
    /// the unit's own suspension points; the executor awaits a running
    /// unit to completion rather than dropping it, so cleanup after the
    /// signal fires always runs.
    async fn run(&self, target: &PhysicalTarget, cancel: CancelSignal)
        -> Result<T, ShardingError>;
}

/// Sink a streaming unit pushes rows into, one at a time.
pub struct RowSink<T> {
    tx: mpsc::Sender<Result<T, ShardingError>>,
    sent: Arc<AtomicU64>,
}

impl<T> RowSink<T> {
    pub(crate) fn new(tx: mpsc::Sender<Result<T, ShardingError>>) -> Self {
        Self {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of rows accepted by the consumer.
    pub(crate) fn sent_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.sent)
    }

    /// Push one row. Returns false when the consumer is gone and the
    /// unit should stop producing.
    pub async fn send(&self, row: T) -> bool {
        if self.tx.send(Ok(row)).await.is_ok() {
            self.sent.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

/// Row-producing unit for the streaming pass-through strategy.
#[async_trait]
pub trait RowStreamUnit<T>: Send + Sync {
    /// Stream the target's rows into the sink in the target's own order.
    async fn stream(
        &self,
        target: &PhysicalTarget,
        sink: RowSink<T>,
        cancel: CancelSignal,
    ) -> Result<(), ShardingError>;
}

/// Windowed fetch unit for the paginated slice strategy.
///
/// The window passed in is the safe per-target superset window, never the
/// caller's logical window.
#[async_trait]
pub trait PageUnit<T>: Send + Sync {
    /// Fetch the target's rows restricted to the window, in the target's
    /// own order.
    async fn fetch(
        &self,
        target: &PhysicalTarget,
        window: PageWindow,
        cancel: CancelSignal,
    ) -> Result<Vec<T>, ShardingError>;
}
