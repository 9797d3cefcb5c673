//! # Cancellation Primitives
//!
//! One cooperative cancellation signal scoped to a logical query,
//! propagated to every in-flight execution unit over a watch channel.

use std::sync::OnceLock;

use tokio::sync::watch;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Create a fresh, uncancelled source.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Derive a signal observers can watch.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request cancellation. Idempotent, and recorded even when no
    /// signal has been subscribed yet.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal. Cheap to clone; one clone is
/// handed to every execution unit.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires, for callers without a cancellation scope.
    pub fn never() -> Self {
        // One process-wide sender keeps the channel open without
        // allocating a new channel per call.
        static NEVER: OnceLock<watch::Sender<bool>> = OnceLock::new();
        let tx = NEVER.get_or_init(|| watch::channel(false).0);
        Self { rx: tx.subscribe() }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Never resolves if the
    /// source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        loop {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_observes_cancel() {
        let source = CancelSource::new();
        let signal = source.signal();
        assert!(!signal.is_cancelled());

        source.cancel();
        assert!(signal.is_cancelled());
        // Resolves promptly once cancelled.
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("cancelled() should resolve");
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let source = CancelSource::new();
        source.cancel();
        source.cancel();
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_without_subscribers_is_recorded() {
        let source = CancelSource::new();
        // No signal exists yet; the cancel must still stick.
        source.cancel();
        assert!(source.is_cancelled());
        assert!(source.signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signals_stay_uncancelled_across_calls() {
        let first = CancelSignal::never();
        let second = CancelSignal::never();
        assert!(!first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_does_not_fire() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(timed_out.is_err());
    }

    #[tokio::test]
    async fn test_clone_sees_cancellation() {
        let source = CancelSource::new();
        let signal = source.signal();
        let clone = signal.clone();
        source.cancel();
        assert!(clone.is_cancelled());
    }
}
