//! # Parallel Execution Controller
//!
//! Fans a unit of work out over a target set under a connection mode, an
//! in-flight ceiling and a failure policy. One reusable primitive shared
//! by every merge strategy.

use crate::domain::{
    ConnectionMode, FailurePolicy, PartialResult, PhysicalTarget, ShardingError,
    DEFAULT_MAX_IN_FLIGHT,
};
use crate::executor::cancel::{CancelSignal, CancelSource};
use crate::ports::outbound::ExecutionUnit;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

/// How a fan-out runs: connection discipline, concurrency ceiling,
/// failure policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Sequential single-connection or concurrent scatter.
    pub connection_mode: ConnectionMode,
    /// Failure handling: strict or lenient.
    pub failure_policy: FailurePolicy,
    /// Ceiling on concurrently executing targets in scatter mode.
    pub max_in_flight: usize,
}

impl ExecutionPolicy {
    /// Concurrent scatter under the default in-flight ceiling.
    pub fn scatter(failure_policy: FailurePolicy) -> Self {
        Self {
            connection_mode: ConnectionMode::Scatter,
            failure_policy,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Single-connection sequential execution.
    pub fn sequential(failure_policy: FailurePolicy) -> Self {
        Self {
            connection_mode: ConnectionMode::Sequential,
            failure_policy,
            max_in_flight: 1,
        }
    }

    /// Override the in-flight ceiling.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }
}

/// One target's recorded failure under the partial-tolerant policy.
#[derive(Debug)]
pub struct TargetFailure {
    /// Target whose unit failed.
    pub target: PhysicalTarget,
    /// The failure.
    pub error: ShardingError,
}

/// Everything a settled fan-out produced.
#[derive(Debug)]
pub struct ExecutionOutcome<T> {
    partials: Vec<PartialResult<T>>,
    failures: Vec<TargetFailure>,
}

impl<T> ExecutionOutcome<T> {
    fn empty() -> Self {
        Self {
            partials: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Per-target results, grouped by target, no cross-target order.
    pub fn partials(&self) -> &[PartialResult<T>] {
        &self.partials
    }

    /// Consume into the partials.
    pub fn into_partials(self) -> Vec<PartialResult<T>> {
        self.partials
    }

    /// Failures excluded from the partials (partial-tolerant only).
    pub fn failures(&self) -> &[TargetFailure] {
        &self.failures
    }

    /// True when at least one target's contribution is missing.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// The fan-out controller.
pub struct ParallelExecutor {
    policy: ExecutionPolicy,
}

impl ParallelExecutor {
    /// Controller with a fixed policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    /// The controller's policy.
    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Execute the unit against every target.
    ///
    /// Fail-fast propagates cancellation to in-flight siblings and
    /// surfaces the first failure; partial-tolerant records failures and
    /// returns a partial outcome. Caller cancellation settles every unit
    /// and returns `Cancelled`.
    pub async fn execute_all<T, U>(
        &self,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<ExecutionOutcome<T>, ShardingError>
    where
        T: Send + 'static,
        U: ExecutionUnit<T> + ?Sized + 'static,
    {
        if targets.is_empty() {
            return Ok(ExecutionOutcome::empty());
        }
        debug!(
            "[shardmerge] executing {} targets mode={:?} policy={:?}",
            targets.len(),
            self.policy.connection_mode,
            self.policy.failure_policy
        );
        match self.policy.connection_mode {
            ConnectionMode::Sequential => self.execute_sequential(targets, unit, cancel).await,
            ConnectionMode::Scatter => self.execute_scatter(targets, unit, cancel).await,
        }
    }

    async fn execute_sequential<T, U>(
        &self,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<ExecutionOutcome<T>, ShardingError>
    where
        T: Send + 'static,
        U: ExecutionUnit<T> + ?Sized + 'static,
    {
        let mut outcome = ExecutionOutcome::empty();
        for target in targets {
            if cancel.is_cancelled() {
                return Err(ShardingError::Cancelled);
            }
            // The unit is awaited to completion; it observes the signal
            // at its own suspension points and returns `Cancelled`, so
            // its cleanup always runs.
            match unit.run(target, cancel.clone()).await {
                Ok(value) => outcome
                    .partials
                    .push(PartialResult::new(target.clone(), value)),
                Err(ShardingError::Cancelled) => return Err(ShardingError::Cancelled),
                Err(error) => match self.policy.failure_policy {
                    FailurePolicy::FailFast => return Err(error),
                    FailurePolicy::PartialTolerant => {
                        warn!("[shardmerge] target [{}] failed: {}", target, error);
                        outcome.failures.push(TargetFailure {
                            target: target.clone(),
                            error,
                        });
                    }
                },
            }
        }
        Ok(outcome)
    }

    async fn execute_scatter<T, U>(
        &self,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<ExecutionOutcome<T>, ShardingError>
    where
        T: Send + 'static,
        U: ExecutionUnit<T> + ?Sized + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.policy.max_in_flight.max(1)));
        // Every unit watches one merged signal: cancelled when the caller
        // cancels or when fail-fast pulls the remaining siblings down.
        let siblings = Arc::new(CancelSource::new());
        let forward = {
            let caller = cancel.clone();
            let siblings = Arc::clone(&siblings);
            tokio::spawn(async move {
                caller.cancelled().await;
                siblings.cancel();
            })
        };

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let unit = Arc::clone(&unit);
            let signal = siblings.signal();
            let done = done_tx.clone();
            handles.push(tokio::spawn(async move {
                // Permit scopes the unit's connection: acquired right
                // before the unit runs, released when it settles. Only
                // the wait for a permit may be abandoned; a running unit
                // is always awaited to completion so its cleanup runs.
                let permit = tokio::select! {
                    _ = signal.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    None => Err(ShardingError::Cancelled),
                    Some(_permit) => unit.run(&target, signal.clone()).await,
                };
                let _ = done.send((target, result));
            }));
        }
        drop(done_tx);

        // Gather in settlement order: a late failure cancels siblings
        // the moment it lands, not after earlier handles finish.
        let mut outcome = ExecutionOutcome::empty();
        let mut first_failure: Option<ShardingError> = None;
        while let Some((target, result)) = done_rx.recv().await {
            match result {
                Ok(value) => {
                    outcome.partials.push(PartialResult::new(target, value));
                }
                Err(ShardingError::Cancelled) => {}
                Err(error) => match self.policy.failure_policy {
                    FailurePolicy::FailFast => {
                        if first_failure.is_none() {
                            warn!(
                                "[shardmerge] target [{}] failed, cancelling siblings: {}",
                                target, error
                            );
                            siblings.cancel();
                            first_failure = Some(error);
                        }
                    }
                    FailurePolicy::PartialTolerant => {
                        warn!("[shardmerge] target [{}] failed: {}", target, error);
                        outcome.failures.push(TargetFailure { target, error });
                    }
                },
            }
        }

        for handle in handles {
            if let Err(join_error) = handle.await {
                let error = ShardingError::Execution {
                    target: "<task>".to_string(),
                    reason: join_error.to_string(),
                };
                match self.policy.failure_policy {
                    FailurePolicy::FailFast => {
                        if first_failure.is_none() {
                            siblings.cancel();
                            first_failure = Some(error);
                        }
                    }
                    FailurePolicy::PartialTolerant => {
                        outcome.failures.push(TargetFailure {
                            target: PhysicalTarget::data_source_only("<task>"),
                            error,
                        });
                    }
                }
            }
        }
        forward.abort();

        if let Some(error) = first_failure {
            return Err(error);
        }
        if cancel.is_cancelled() {
            return Err(ShardingError::Cancelled);
        }
        Ok(outcome)
    }
}
