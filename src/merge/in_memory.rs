//! # In-Memory Full Merge
//!
//! Drains every target completely, then sorts into one stable global
//! order. The only strategy that can honor cross-target ordering, global
//! distinct or grouping, because none of those are computable from
//! prefixes. Drained-or-nothing: a cancellation or fail-fast failure
//! yields no rows at all.

use crate::domain::{MergePhase, PhysicalTarget, ShardingError};
use crate::executor::{CancelSignal, ExecutionOutcome, ExecutionPolicy, ParallelExecutor};
use crate::merge::session::MergeSession;
use crate::merge::Merged;
use crate::ports::outbound::ExecutionUnit;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Global ordering for the materializing strategies.
pub struct OrderSpec<T> {
    compare: Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>,
    distinct: bool,
}

impl<T> OrderSpec<T> {
    /// Order by a comparator.
    pub fn by<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
            distinct: false,
        }
    }

    /// Order by an extracted key.
    pub fn by_key<K, F>(key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::by(move |a, b| key(a).cmp(&key(b)))
    }

    /// Also drop comparator-equal duplicates (global distinct).
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub(crate) fn apply(&self, rows: &mut Vec<T>) {
        rows.sort_by(|a, b| (self.compare)(a, b));
        if self.distinct {
            let compare = &self.compare;
            rows.dedup_by(|a, b| compare(a, b) == Ordering::Equal);
        }
    }
}

impl<T> Clone for OrderSpec<T> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
            distinct: self.distinct,
        }
    }
}

/// Owned, fully materialized rows. The buffered counterpart of
/// [`MergedStream`](crate::merge::streaming::MergedStream); a strategy
/// picks one mode up front and never switches.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedRows<T>(Vec<T>);

impl<T> Default for BufferedRows<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> BufferedRows<T> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no rows matched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrowed view.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Consume into the rows.
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T> IntoIterator for BufferedRows<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The in-memory full-merge engine.
pub struct InMemoryMergeEngine {
    executor: ParallelExecutor,
}

impl InMemoryMergeEngine {
    /// Engine over a fixed execution policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            executor: ParallelExecutor::new(policy),
        }
    }

    /// Run the session choreography around `execute_all`, returning
    /// `None` on the empty-target fast path.
    pub(crate) async fn collect<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Option<ExecutionOutcome<T>>, ShardingError>
    where
        T: Send + 'static,
        U: ExecutionUnit<T> + ?Sized + 'static,
    {
        session.advance(MergePhase::Dispatching)?;
        if targets.is_empty() {
            session.advance(MergePhase::Complete)?;
            return Ok(None);
        }
        session.advance(MergePhase::Collecting)?;
        let outcome = match self.executor.execute_all(targets, unit, cancel).await {
            Ok(outcome) => outcome,
            Err(ShardingError::Cancelled) => {
                // The caller withdrew the query; that is not a failure.
                session.cancel();
                return Err(ShardingError::Cancelled);
            }
            Err(error) => {
                session.fail();
                return Err(error);
            }
        };
        session.advance(MergePhase::Reducing)?;
        Ok(Some(outcome))
    }

    /// Drain every target, then sort into the global order.
    pub async fn merge<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        order: &OrderSpec<T>,
        cancel: &CancelSignal,
    ) -> Result<Merged<BufferedRows<T>>, ShardingError>
    where
        T: Send + 'static,
        U: ExecutionUnit<Vec<T>> + ?Sized + 'static,
    {
        let outcome = match self.collect(session, targets, unit, cancel).await? {
            Some(outcome) => outcome,
            None => return Ok(Merged::complete(BufferedRows::default())),
        };

        let partial = outcome.is_partial();
        let mut rows = Vec::new();
        for result in outcome.into_partials() {
            let (target, target_rows) = result.into_parts();
            session.record(target, target_rows.len() as f64);
            rows.extend(target_rows);
        }
        order.apply(&mut rows);
        debug!(
            "[shardmerge] session {} merged {} rows from {} targets",
            session.id(),
            rows.len(),
            targets.len()
        );
        session.advance(MergePhase::Complete)?;
        Ok(Merged {
            value: BufferedRows(rows),
            partial,
        })
    }
}
