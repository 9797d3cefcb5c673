//! # Execution Layer
//!
//! Cancellation primitives and the parallel execution controller.

pub mod cancel;
pub mod control;

pub use cancel::{CancelSignal, CancelSource};
pub use control::{ExecutionOutcome, ExecutionPolicy, ParallelExecutor, TargetFailure};
