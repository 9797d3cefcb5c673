//! # Algorithms
//!
//! Route rule evaluation, aggregate combinators and page-window math.

pub mod aggregate;
pub mod pagination;
pub mod route_rule;

pub use aggregate::{combine_average, max_value, min_value, sum_values};
pub use pagination::{trim_to_window, PageWindow};
pub use route_rule::RouteRuleEngine;
