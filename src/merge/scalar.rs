//! # Scalar Aggregate Reduction
//!
//! Per-target scalars combined with the matching associative combinator.
//! Averages recombine from (sum, count) pairs so shard cardinality never
//! skews the result. Count and average contributions land in the merge
//! session for pagination and metrics consumers.

use crate::algorithms::aggregate::{combine_average, max_value, min_value, sum_values};
use crate::domain::{MergePhase, PhysicalTarget, ShardingError};
use crate::executor::{CancelSignal, ExecutionPolicy};
use crate::merge::in_memory::InMemoryMergeEngine;
use crate::merge::session::MergeSession;
use crate::merge::Merged;
use crate::ports::outbound::ExecutionUnit;
use std::ops::Add;
use std::sync::Arc;

/// The scalar aggregate merge engine.
pub struct AggregateMergeEngine {
    inner: InMemoryMergeEngine,
}

impl AggregateMergeEngine {
    /// Engine over a fixed execution policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            inner: InMemoryMergeEngine::new(policy),
        }
    }

    /// Global count: sum of per-target counts.
    pub async fn count<U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Merged<u64>, ShardingError>
    where
        U: ExecutionUnit<u64> + ?Sized + 'static,
    {
        let outcome = match self.inner.collect(session, targets, unit, cancel).await? {
            Some(outcome) => outcome,
            None => return Ok(Merged::complete(0)),
        };
        let partial = outcome.is_partial();
        let mut counts = Vec::with_capacity(outcome.partials().len());
        for result in outcome.into_partials() {
            let (target, count) = result.into_parts();
            session.record(target, count as f64);
            counts.push(count);
        }
        session.advance(MergePhase::Complete)?;
        Ok(Merged {
            value: sum_values(counts),
            partial,
        })
    }

    /// Global sum of per-target sums.
    pub async fn sum<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Merged<T>, ShardingError>
    where
        T: Add<Output = T> + Default + Send + 'static,
        U: ExecutionUnit<T> + ?Sized + 'static,
    {
        let outcome = match self.inner.collect(session, targets, unit, cancel).await? {
            Some(outcome) => outcome,
            None => return Ok(Merged::complete(T::default())),
        };
        let partial = outcome.is_partial();
        let values: Vec<T> = outcome
            .into_partials()
            .into_iter()
            .map(|p| p.into_value())
            .collect();
        session.advance(MergePhase::Complete)?;
        Ok(Merged {
            value: sum_values(values),
            partial,
        })
    }

    /// Global minimum of per-target minimums. `None` when no target
    /// contributed.
    pub async fn min<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Merged<Option<T>>, ShardingError>
    where
        T: Ord + Send + 'static,
        U: ExecutionUnit<Option<T>> + ?Sized + 'static,
    {
        self.extreme(session, targets, unit, cancel, min_value).await
    }

    /// Global maximum of per-target maximums.
    pub async fn max<T, U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Merged<Option<T>>, ShardingError>
    where
        T: Ord + Send + 'static,
        U: ExecutionUnit<Option<T>> + ?Sized + 'static,
    {
        self.extreme(session, targets, unit, cancel, max_value).await
    }

    async fn extreme<T, U, F>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
        pick: F,
    ) -> Result<Merged<Option<T>>, ShardingError>
    where
        T: Ord + Send + 'static,
        U: ExecutionUnit<Option<T>> + ?Sized + 'static,
        F: Fn(Vec<T>) -> Option<T>,
    {
        let outcome = match self.inner.collect(session, targets, unit, cancel).await? {
            Some(outcome) => outcome,
            None => return Ok(Merged::complete(None)),
        };
        let partial = outcome.is_partial();
        let values: Vec<T> = outcome
            .into_partials()
            .into_iter()
            .filter_map(|p| p.into_value())
            .collect();
        session.advance(MergePhase::Complete)?;
        Ok(Merged {
            value: pick(values),
            partial,
        })
    }

    /// Global average recombined from per-target (sum, count) pairs.
    pub async fn average<U>(
        &self,
        session: &MergeSession,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<Merged<Option<f64>>, ShardingError>
    where
        U: ExecutionUnit<(f64, u64)> + ?Sized + 'static,
    {
        let outcome = match self.inner.collect(session, targets, unit, cancel).await? {
            Some(outcome) => outcome,
            None => return Ok(Merged::complete(None)),
        };
        let partial = outcome.is_partial();
        let mut pairs = Vec::with_capacity(outcome.partials().len());
        for result in outcome.into_partials() {
            let (target, (sum, count)) = result.into_parts();
            session.record(target, count as f64);
            pairs.push((sum, count));
        }
        session.advance(MergePhase::Complete)?;
        Ok(Merged {
            value: combine_average(&pairs),
            partial,
        })
    }
}
