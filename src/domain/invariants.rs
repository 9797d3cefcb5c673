//! # Domain Invariants
//!
//! Rules that must always hold for routing and merging, written as
//! checkable functions.

use super::entities::RouteResult;
use super::errors::ShardingError;
use super::value_objects::ShardValue;

/// Default ceiling on concurrently executing targets.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Default bounded wait on the registry candidate cache, in milliseconds.
pub const DEFAULT_CACHE_WAIT_MS: u64 = 100;

/// Invariant: exact-value routing is deterministic.
///
/// Same key value, same route function, same target.
pub fn invariant_deterministic_routing<F>(route_fn: F, value: &ShardValue) -> bool
where
    F: Fn(&ShardValue) -> String,
{
    route_fn(value) == route_fn(value)
}

/// Invariant: predicate routing never over-excludes.
///
/// Every target that could hold a matching row must be included. Scanning
/// extra targets is safe; dropping one silently loses rows.
pub fn invariant_conservative_inclusion(
    included: &[String],
    must_include: &[String],
) -> Result<(), ShardingError> {
    for name in must_include {
        if !included.iter().any(|n| n == name) {
            return Err(ShardingError::RouteContradiction {
                entities: format!("predicate route dropped reachable target [{}]", name),
            });
        }
    }
    Ok(())
}

/// Invariant: a multi-entity route result is a subset of every entity's
/// independently computed candidate set.
pub fn invariant_intersection_subset(
    result: &RouteResult,
    per_entity: &[RouteResult],
) -> Result<(), ShardingError> {
    for candidates in per_entity {
        for target in result.targets() {
            if !candidates.contains(target) {
                return Err(ShardingError::RouteContradiction {
                    entities: format!("route result contains non-candidate target [{}]", target),
                });
            }
        }
    }
    Ok(())
}

/// Invariant: averages recombine from per-target (sum, count) pairs.
///
/// For any partition of a dataset, the recombined average equals the
/// global average; averaging the per-target averages does not.
pub fn invariant_partition_average(pairs: &[(f64, u64)], global_avg: f64, epsilon: f64) -> bool {
    let total: u64 = pairs.iter().map(|(_, c)| c).sum();
    if total == 0 {
        return global_avg == 0.0;
    }
    let sum: f64 = pairs.iter().map(|(s, _)| s).sum();
    (sum / total as f64 - global_avg).abs() <= epsilon
}

/// Invariant: no unit outlives its fan-out.
///
/// After an execution settles (success, failure or cancellation) the
/// in-flight gauge must read zero.
pub fn invariant_no_unit_in_flight(in_flight: usize) -> Result<(), ShardingError> {
    if in_flight != 0 {
        return Err(ShardingError::Execution {
            target: "<fan-out>".to_string(),
            reason: format!("{} units still in flight after settlement", in_flight),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PhysicalTarget;

    #[test]
    fn test_invariant_deterministic_routing() {
        let route = |v: &ShardValue| format!("ds{}", v);
        assert!(invariant_deterministic_routing(route, &ShardValue::Int(7)));
    }

    #[test]
    fn test_invariant_conservative_inclusion_pass() {
        let included = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let must = vec!["B".to_string()];
        assert!(invariant_conservative_inclusion(&included, &must).is_ok());
    }

    #[test]
    fn test_invariant_conservative_inclusion_over_exclusion_fails() {
        let included = vec!["A".to_string()];
        let must = vec!["B".to_string()];
        assert!(invariant_conservative_inclusion(&included, &must).is_err());
    }

    #[test]
    fn test_invariant_intersection_subset_pass() {
        let a = RouteResult::new(vec![
            PhysicalTarget::data_source_only("A"),
            PhysicalTarget::data_source_only("B"),
        ]);
        let b = RouteResult::new(vec![PhysicalTarget::data_source_only("B")]);
        let result = a.intersect(&b);
        assert!(invariant_intersection_subset(&result, &[a, b]).is_ok());
    }

    #[test]
    fn test_invariant_intersection_subset_violation() {
        let a = RouteResult::new(vec![PhysicalTarget::data_source_only("A")]);
        let result = RouteResult::new(vec![PhysicalTarget::data_source_only("B")]);
        assert!(invariant_intersection_subset(&result, &[a]).is_err());
    }

    #[test]
    fn test_invariant_partition_average() {
        // Dataset {1..6} split unevenly: global average 3.5.
        let pairs = vec![(1.0 + 2.0, 2u64), (3.0 + 4.0 + 5.0 + 6.0, 4u64)];
        assert!(invariant_partition_average(&pairs, 3.5, 1e-9));
        // Average of averages would be (1.5 + 4.5) / 2 = 3.0, which is wrong.
        assert!(!invariant_partition_average(&pairs, 3.0, 1e-9));
    }

    #[test]
    fn test_invariant_no_unit_in_flight() {
        assert!(invariant_no_unit_in_flight(0).is_ok());
        assert!(invariant_no_unit_in_flight(2).is_err());
    }
}
