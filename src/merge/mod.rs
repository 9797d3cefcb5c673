//! # Stream-Merge Engine Family
//!
//! One merge strategy per result shape. Every engine runs the same
//! choreography: dispatch units across routed targets through the
//! parallel execution controller, collect per-target partials, reduce
//! them into one logical result. The [`MergeSession`](session::MergeSession)
//! tracks phase transitions and per-target contributions for the run.

pub mod in_memory;
pub mod paged;
pub mod scalar;
pub mod session;
pub mod streaming;

pub use in_memory::{BufferedRows, InMemoryMergeEngine, OrderSpec};
pub use paged::{Page, PagedMergeEngine};
pub use scalar::AggregateMergeEngine;
pub use session::{MergeSession, TargetContribution};
pub use streaming::{MergedStream, StreamingMergeEngine};

/// A reduced result plus whether any routed target was skipped.
///
/// `partial` is only ever true under
/// [`FailurePolicy::PartialTolerant`](crate::domain::FailurePolicy); the
/// fail-fast policy surfaces the first failure as an error instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T> {
    /// The reduced value.
    pub value: T,
    /// True when at least one routed target failed and was excluded.
    pub partial: bool,
}

impl<T> Merged<T> {
    /// A result with every routed target accounted for.
    pub fn complete(value: T) -> Self {
        Self {
            value,
            partial: false,
        }
    }
}
