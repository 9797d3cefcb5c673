//! # Page Windows
//!
//! Translation of a logical (skip, take) window into the safe per-target
//! superset window, and the final trim back to the logical window.

use serde::{Deserialize, Serialize};

/// A pagination window: skip then take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    /// Rows to skip.
    pub skip: usize,
    /// Rows to return.
    pub take: usize,
}

impl PageWindow {
    /// Create a window.
    pub fn new(skip: usize, take: usize) -> Self {
        Self { skip, take }
    }

    /// The superset window each target must answer.
    ///
    /// Per-target row distribution is unknown, so every target must return
    /// its first `skip + take` rows; anything less can under-fetch and
    /// drop logical rows.
    pub fn per_target(&self) -> PageWindow {
        PageWindow {
            skip: 0,
            take: self.skip.saturating_add(self.take),
        }
    }
}

/// Trim a globally ordered row set to the logical window.
pub fn trim_to_window<T>(rows: Vec<T>, window: PageWindow) -> Vec<T> {
    rows.into_iter()
        .skip(window.skip)
        .take(window.take)
        .collect()
}
