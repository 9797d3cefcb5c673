//! # Aggregate Combinators
//!
//! Associative, order-independent combinators for per-target scalars.

use std::ops::Add;

/// Sum per-target values. Covers counts and sums.
pub fn sum_values<T, I>(values: I) -> T
where
    T: Add<Output = T> + Default,
    I: IntoIterator<Item = T>,
{
    values.into_iter().fold(T::default(), Add::add)
}

/// Minimum of per-target minimums. None when no target contributed.
pub fn min_value<T: Ord, I: IntoIterator<Item = T>>(values: I) -> Option<T> {
    values.into_iter().min()
}

/// Maximum of per-target maximums. None when no target contributed.
pub fn max_value<T: Ord, I: IntoIterator<Item = T>>(values: I) -> Option<T> {
    values.into_iter().max()
}

/// Global average recombined from per-target (sum, count) pairs.
///
/// Never averages the per-target averages; that weights small shards the
/// same as large ones and skews the result.
pub fn combine_average(pairs: &[(f64, u64)]) -> Option<f64> {
    let count: u64 = pairs.iter().map(|(_, c)| c).sum();
    if count == 0 {
        return None;
    }
    let sum: f64 = pairs.iter().map(|(s, _)| s).sum();
    Some(sum / count as f64)
}
