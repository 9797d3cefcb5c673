//! # Merge Session
//!
//! Request-scoped bookkeeping: the merge phase state machine and the
//! per-target contribution ledger external observers (pagination,
//! metrics) can read after the merge completes.

use crate::domain::{MergePhase, PhysicalTarget, ShardingError};
use parking_lot::Mutex;
use uuid::Uuid;

/// One target's recorded contribution to a merge: a row count or a
/// scalar, depending on the strategy.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetContribution {
    /// Contributing target.
    pub target: PhysicalTarget,
    /// Recorded scalar (row count for row merges).
    pub value: f64,
}

/// Per-request merge session. Owned by one logical query invocation;
/// never shared across concurrent queries.
pub struct MergeSession {
    id: Uuid,
    phase: Mutex<MergePhase>,
    contributions: Mutex<Vec<TargetContribution>>,
}

impl MergeSession {
    /// Fresh session in the idle phase.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Mutex::new(MergePhase::Idle),
            contributions: Mutex::new(Vec::new()),
        }
    }

    /// Correlation id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> MergePhase {
        *self.phase.lock()
    }

    /// Advance the state machine, rejecting invalid transitions.
    pub(crate) fn advance(&self, next: MergePhase) -> Result<(), ShardingError> {
        let mut phase = self.phase.lock();
        if !phase.can_transition_to(next) {
            return Err(ShardingError::InvalidTransition {
                from: phase.to_string(),
                to: next.to_string(),
            });
        }
        *phase = next;
        Ok(())
    }

    /// Mark the session failed from whatever phase it is in. Terminal
    /// phases stay as they are.
    pub(crate) fn fail(&self) {
        let mut phase = self.phase.lock();
        if !phase.is_terminal() {
            *phase = MergePhase::Failed;
        }
    }

    /// Mark the session cancelled. Cancellation is not a failure: the
    /// caller withdrew the query rather than a target breaking. Terminal
    /// phases stay as they are.
    pub(crate) fn cancel(&self) {
        let mut phase = self.phase.lock();
        if !phase.is_terminal() {
            *phase = MergePhase::Cancelled;
        }
    }

    /// Record one target's contribution.
    pub(crate) fn record(&self, target: PhysicalTarget, value: f64) {
        self.contributions
            .lock()
            .push(TargetContribution { target, value });
    }

    /// Snapshot of the recorded contributions.
    pub fn contributions(&self) -> Vec<TargetContribution> {
        self.contributions.lock().clone()
    }

    /// Sum of recorded contribution values.
    pub fn total_recorded(&self) -> f64 {
        self.contributions.lock().iter().map(|c| c.value).sum()
    }
}

impl Default for MergeSession {
    fn default() -> Self {
        Self::new()
    }
}
