//! # Streaming Pass-Through Merge
//!
//! Rows flow to the consumer as targets produce them, without buffering
//! whole result sets. No cross-target order is imposed. Failures arrive
//! in-band as `Err` items; cancellation ends the stream silently after
//! every in-flight unit settles.

use crate::domain::{ConnectionMode, FailurePolicy, MergePhase, PhysicalTarget, ShardingError};
use crate::executor::{CancelSignal, CancelSource, ExecutionPolicy};
use crate::merge::session::MergeSession;
use crate::ports::outbound::{RowSink, RowStreamUnit};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Consumer handle over a merging row stream.
pub struct MergedStream<T> {
    rx: mpsc::Receiver<Result<T, ShardingError>>,
}

impl<T> MergedStream<T> {
    /// Next row, or an in-band failure, or `None` once every target has
    /// settled.
    pub async fn next(&mut self) -> Option<Result<T, ShardingError>> {
        self.rx.recv().await
    }

    /// Adapt to a `Stream` for combinator-style consumption.
    pub fn into_stream(self) -> ReceiverStream<Result<T, ShardingError>> {
        ReceiverStream::new(self.rx)
    }
}

/// The streaming pass-through merge engine.
pub struct StreamingMergeEngine {
    policy: ExecutionPolicy,
}

impl StreamingMergeEngine {
    /// Engine over a fixed execution policy.
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    /// Open one merged stream over `targets`.
    ///
    /// Each target's unit pushes rows into a bounded channel sized to the
    /// target count, so a slow consumer backpressures every producer.
    /// Under fail-fast the first failure cancels the remaining units and
    /// surfaces as the stream's final `Err` item; under partial-tolerant
    /// each failure is an `Err` item and the stream continues.
    pub fn merge<T, U>(
        &self,
        session: Arc<MergeSession>,
        targets: &[PhysicalTarget],
        unit: Arc<U>,
        cancel: &CancelSignal,
    ) -> Result<MergedStream<T>, ShardingError>
    where
        T: Send + 'static,
        U: RowStreamUnit<T> + ?Sized + 'static,
    {
        session.advance(MergePhase::Dispatching)?;
        if targets.is_empty() {
            session.advance(MergePhase::Complete)?;
            let (_tx, rx) = mpsc::channel(1);
            return Ok(MergedStream { rx });
        }
        session.advance(MergePhase::Collecting)?;
        debug!(
            "[shardmerge] streaming merge over {} targets session={}",
            targets.len(),
            session.id()
        );

        let slots = match self.policy.connection_mode {
            ConnectionMode::Sequential => 1,
            ConnectionMode::Scatter => self.policy.max_in_flight.max(1),
        };
        let semaphore = Arc::new(Semaphore::new(slots));
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
        let (tx, rx) = mpsc::channel(targets.len());
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for target in targets.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let unit = Arc::clone(&unit);
            let session = Arc::clone(&session);
            let signal = siblings.signal();
            let sink = RowSink::new(tx.clone());
            let done = done_tx.clone();
            tokio::spawn(async move {
                let rows = sink.sent_counter();
                // Only the wait for a permit may be abandoned; a running
                // unit is always awaited to completion so its cleanup runs.
                let permit = tokio::select! {
                    _ = signal.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    None => Err(ShardingError::Cancelled),
                    Some(_permit) => unit.stream(&target, sink, signal.clone()).await,
                };
                if result.is_ok() {
                    session.record(target.clone(), rows.load(Ordering::Relaxed) as f64);
                }
                let _ = done.send((target, result));
            });
        }
        drop(done_tx);

        let failure_policy = self.policy.failure_policy;
        let caller = cancel.clone();
        tokio::spawn(async move {
            // Settlement order, not dispatch order: a late failure pulls
            // the still-running siblings down the moment it lands.
            let mut failed = false;
            while let Some((target, result)) = done_rx.recv().await {
                match result {
                    Ok(()) => {}
                    Err(ShardingError::Cancelled) => {}
                    Err(error) => {
                        warn!("[shardmerge] stream target [{}] failed: {}", target, error);
                        match failure_policy {
                            FailurePolicy::FailFast => {
                                if !failed {
                                    siblings.cancel();
                                    let _ = tx.send(Err(error)).await;
                                }
                            }
                            FailurePolicy::PartialTolerant => {
                                let _ = tx.send(Err(error)).await;
                            }
                        }
                        failed = true;
                    }
                }
            }
            forward.abort();
            if failed {
                session.fail();
            } else if caller.is_cancelled() {
                session.cancel();
            } else {
                if let Err(error) = session.advance(MergePhase::Reducing) {
                    warn!("[shardmerge] session {}: {}", session.id(), error);
                }
                if let Err(error) = session.advance(MergePhase::Complete) {
                    warn!("[shardmerge] session {}: {}", session.id(), error);
                }
            }
        });

        Ok(MergedStream { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CancelSource;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn targets(names: &[&str]) -> Vec<PhysicalTarget> {
        names
            .iter()
            .map(|n| PhysicalTarget::data_source_only(*n))
            .collect()
    }

    struct LocalRows(HashMap<String, Vec<i64>>);

    #[async_trait]
    impl RowStreamUnit<i64> for LocalRows {
        async fn stream(
            &self,
            target: &PhysicalTarget,
            sink: RowSink<i64>,
            cancel: CancelSignal,
        ) -> Result<(), ShardingError> {
            let rows = self.0.get(target.data_source()).cloned().unwrap_or_default();
            for row in rows {
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

    fn abc_rows() -> Arc<LocalRows> {
        Arc::new(LocalRows(
            [
                ("A".to_string(), vec![1i64, 4]),
                ("B".to_string(), vec![2, 5]),
                ("C".to_string(), vec![3, 6]),
            ]
            .into_iter()
            .collect(),
        ))
    }

    #[tokio::test]
    async fn test_stream_yields_every_row() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B", "C"]),
                abc_rows(),
                &CancelSignal::never(),
            )
            .unwrap();

        let mut rows = Vec::new();
        while let Some(item) = stream.next().await {
            rows.push(item.unwrap());
        }
        rows.sort();
        assert_eq!(rows, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(session.phase(), MergePhase::Complete);
        assert_eq!(session.total_recorded(), 6.0);
    }

    #[tokio::test]
    async fn test_empty_targets_close_immediately() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(Arc::clone(&session), &[], abc_rows(), &CancelSignal::never())
            .unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(session.phase(), MergePhase::Complete);
    }

    #[tokio::test]
    async fn test_into_stream_combinators() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let stream = engine
            .merge(
                session,
                &targets(&["A", "B"]),
                abc_rows(),
                &CancelSignal::never(),
            )
            .unwrap();
        let sum: i64 = stream
            .into_stream()
            .filter_map(|item| item.ok())
            .fold(0, |acc, row| acc + row)
            .await;
        assert_eq!(sum, 1 + 4 + 2 + 5);
    }

    struct FailOn {
        bad: &'static str,
        rows: Vec<i64>,
    }

    #[async_trait]
    impl RowStreamUnit<i64> for FailOn {
        async fn stream(
            &self,
            target: &PhysicalTarget,
            sink: RowSink<i64>,
            _cancel: CancelSignal,
        ) -> Result<(), ShardingError> {
            if target.data_source() == self.bad {
                return Err(ShardingError::Execution {
                    target: target.to_string(),
                    reason: "io".to_string(),
                });
            }
            for row in &self.rows {
                if !sink.send(*row).await {
                    break;
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_error_in_band() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B"]),
                Arc::new(FailOn {
                    bad: "B",
                    rows: vec![1, 2],
                }),
                &CancelSignal::never(),
            )
            .unwrap();

        let mut saw_error = false;
        while let Some(item) = stream.next().await {
            if item.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert_eq!(session.phase(), MergePhase::Failed);
    }

    #[tokio::test]
    async fn test_partial_tolerant_keeps_streaming() {
        let engine =
            StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::PartialTolerant));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B", "C"]),
                Arc::new(FailOn {
                    bad: "B",
                    rows: vec![7],
                }),
                &CancelSignal::never(),
            )
            .unwrap();

        let mut rows = Vec::new();
        let mut errors = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(row) => rows.push(row),
                Err(_) => errors += 1,
            }
        }
        // Healthy targets both delivered despite the failure.
        assert_eq!(rows, vec![7, 7]);
        assert_eq!(errors, 1);
    }

    struct Endless;

    #[async_trait]
    impl RowStreamUnit<i64> for Endless {
        async fn stream(
            &self,
            _target: &PhysicalTarget,
            sink: RowSink<i64>,
            cancel: CancelSignal,
        ) -> Result<(), ShardingError> {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ShardingError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {
                        if !sink.send(0).await {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream_silently() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let source = CancelSource::new();
        let signal = source.signal();
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B"]),
                Arc::new(Endless),
                &signal,
            )
            .unwrap();

        // Consume a few rows, then cancel.
        for _ in 0..3 {
            assert!(stream.next().await.is_some());
        }
        source.cancel();
        while let Some(item) = stream.next().await {
            // Drained rows are fine; no in-band error arrives.
            assert!(item.is_ok());
        }
        assert_eq!(session.phase(), MergePhase::Cancelled);
    }

    /// The designated target fails after a short delay; every other
    /// target streams endlessly until cancelled.
    struct LateFail {
        bad: &'static str,
    }

    #[async_trait]
    impl RowStreamUnit<i64> for LateFail {
        async fn stream(
            &self,
            target: &PhysicalTarget,
            sink: RowSink<i64>,
            cancel: CancelSignal,
        ) -> Result<(), ShardingError> {
            if target.data_source() == self.bad {
                tokio::time::sleep(Duration::from_millis(20)).await;
                return Err(ShardingError::Execution {
                    target: target.to_string(),
                    reason: "io".to_string(),
                });
            }
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ShardingError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {
                        if !sink.send(0).await {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fail_fast_on_last_target_stops_endless_siblings() {
        let engine = StreamingMergeEngine::new(ExecutionPolicy::scatter(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B", "C"]),
                Arc::new(LateFail { bad: "C" }),
                &CancelSignal::never(),
            )
            .unwrap();

        // The failure on the last dispatched target must end the stream
        // even though its siblings would otherwise produce forever.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            let mut saw_error = false;
            while let Some(item) = stream.next().await {
                if item.is_err() {
                    saw_error = true;
                }
            }
            saw_error
        })
        .await
        .expect("stream should end promptly after the failure");
        assert!(drained);
        assert_eq!(session.phase(), MergePhase::Failed);
    }

    #[tokio::test]
    async fn test_sequential_streams_one_target_at_a_time() {
        let engine =
            StreamingMergeEngine::new(ExecutionPolicy::sequential(FailurePolicy::FailFast));
        let session = Arc::new(MergeSession::new());
        let mut stream = engine
            .merge(
                Arc::clone(&session),
                &targets(&["A", "B", "C"]),
                abc_rows(),
                &CancelSignal::never(),
            )
            .unwrap();
        let mut rows = Vec::new();
        while let Some(item) = stream.next().await {
            rows.push(item.unwrap());
        }
        assert_eq!(rows.len(), 6);
        assert_eq!(session.phase(), MergePhase::Complete);
    }
}
