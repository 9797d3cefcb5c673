//! # Paged Merge
//!
//! Cross-shard pagination. No target knows the global row order, so each
//! target is asked for the superset window `(0, skip + take)`, the
//! supersets are merged under the global ordering, and the requested
//! window is cut from the merged sequence.

use crate::algorithms::pagination::{trim_to_window, PageWindow};
use crate::domain::{PhysicalTarget, ShardingError};
use crate::executor::{CancelSignal, ExecutionPolicy};
use crate::merge::in_memory::{InMemoryMergeEngine, OrderSpec};
use crate::merge::session::MergeSession;
use crate::ports::outbound::{ExecutionUnit, PageUnit};
use async_trait::async_trait;
use std::sync::Arc;

/// One page of globally ordered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows inside the requested window, globally ordered.
    pub rows: Vec<T>,
    /// The window the caller asked for.
    pub window: PageWindow,
    /// True when a failed target was excluded under the partial-tolerant
    /// policy.
    pub partial: bool,
}

/// Adapts a [`PageUnit`] to the plain execution unit contract by pinning
/// the per-target superset window.
struct WindowedUnit<T, U: ?Sized> {
    inner: Arc<U>,
    window: PageWindow,
    _rows: std::marker::PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, U> ExecutionUnit<Vec<T>> for WindowedUnit<T, U>
where
    T: Send + 'static,
    U: PageUnit<T> + ?Sized + 'static,
{
    async fn run(
        &self,
        target: &PhysicalTarget,
        cancel: CancelSignal,
    ) -> Result<Vec<T>, ShardingError> {
        self.inner.fetch(target, self.window, cancel).await
    }
}

/// The pagination merge engine.
pub struct PagedMergeEngine {
    inner: InMemoryMergeEngine,
}

impl PagedMergeEngine {
    /// Engine over a fixed execution policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            inner: InMemoryMergeEngine::new(policy),
        }
    }

    /// Fetch one globally ordered page across `targets`.
    ///
    /// Each target receives the superset window `(0, skip + take)`; the
    /// merged supersets are ordered by `order` and trimmed to `window`.
    pub async fn page<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        window: PageWindow,
        order: OrderSpec<T>,
        cancel: &CancelSignal,
    ) -> Result<Page<T>, ShardingError>
    where
        T: Send + 'static,
        U: PageUnit<T> + ?Sized + 'static,
    {
        let windowed = Arc::new(WindowedUnit {
            inner: unit,
            window: window.per_target(),
            _rows: std::marker::PhantomData,
        });
        let merged = self
            .inner
            .merge(session, targets, windowed, &order, cancel)
            .await?;
        let partial = merged.partial;
        let rows = trim_to_window(merged.value.into_vec(), window);
        Ok(Page {
            rows,
            window,
            partial,
        })
    }
}
