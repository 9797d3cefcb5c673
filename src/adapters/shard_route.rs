//! # Shard Route Adapters
//!
//! Two concrete shard-key-to-target mappings: an explicit lookup table
//! and a Keccak256 hash route. Both prune only predicate shapes they can
//! prove; everything else stays conservative.

use crate::domain::{KeyPredicate, ShardValue, ShardingError};
use crate::ports::outbound::ShardRoute;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;

/// Route with an explicit value-to-target table.
///
/// The table is the complete topology for the entity: a value with no
/// entry is stored nowhere, so `Eq`/`In` predicates are provably
/// excludable down to their mapped targets.
pub struct LookupShardRoute {
    entity: String,
    table: HashMap<ShardValue, String>,
}

impl LookupShardRoute {
    /// Build from any (value, target-name) collection.
    pub fn new(
        entity: impl Into<String>,
        table: impl IntoIterator<Item = (ShardValue, String)>,
    ) -> Self {
        Self {
            entity: entity.into(),
            table: table.into_iter().collect(),
        }
    }
}

impl ShardRoute for LookupShardRoute {
    fn route_value(&self, value: &ShardValue) -> Result<String, ShardingError> {
        self.table
            .get(value)
            .cloned()
            .ok_or_else(|| ShardingError::UnmappedShardKeyValue {
                entity: self.entity.clone(),
                value: value.to_string(),
            })
    }

    fn route_predicate(&self, predicate: &KeyPredicate, candidates: &[String]) -> Vec<String> {
        match predicate {
            KeyPredicate::Eq(value) => self.table.get(value).cloned().into_iter().collect(),
            KeyPredicate::In(values) => {
                let mut names: Vec<String> = values
                    .iter()
                    .filter_map(|v| self.table.get(v).cloned())
                    .collect();
                names.sort();
                names.dedup();
                names
            }
            // Range shapes are not enumerable against a lookup table.
            KeyPredicate::Range { .. } => candidates.to_vec(),
        }
    }
}

/// Route by Keccak256 of the key value, modulo the target list.
///
/// Deterministic across processes; used when no explicit topology table
/// exists.
pub struct HashShardRoute {
    entity: String,
    names: Vec<String>,
}

impl HashShardRoute {
    /// Build over a fixed, ordered target-name list.
    pub fn new(entity: impl Into<String>, names: Vec<String>) -> Self {
        Self {
            entity: entity.into(),
            names,
        }
    }

    fn slot_for(&self, value: &ShardValue) -> Option<&String> {
        if self.names.is_empty() {
            return None;
        }
        let mut hasher = Keccak256::new();
        match value {
            ShardValue::Int(v) => hasher.update(v.to_be_bytes()),
            ShardValue::Text(v) => hasher.update(v.as_bytes()),
            ShardValue::Null => return None,
        }
        let digest = hasher.finalize();
        let slot = u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]) as usize
            % self.names.len();
        self.names.get(slot)
    }
}

impl ShardRoute for HashShardRoute {
    fn route_value(&self, value: &ShardValue) -> Result<String, ShardingError> {
        self.slot_for(value)
            .cloned()
            .ok_or_else(|| ShardingError::UnmappedShardKeyValue {
                entity: self.entity.clone(),
                value: value.to_string(),
            })
    }

    fn route_predicate(&self, predicate: &KeyPredicate, candidates: &[String]) -> Vec<String> {
        match predicate {
            KeyPredicate::Eq(value) => match self.slot_for(value) {
                Some(name) => vec![name.clone()],
                None => candidates.to_vec(),
            },
            KeyPredicate::In(values) => {
                let mut names = Vec::with_capacity(values.len());
                for value in values {
                    match self.slot_for(value) {
                        Some(name) => names.push(name.clone()),
                        // A value the hash cannot place keeps everything in.
                        None => return candidates.to_vec(),
                    }
                }
                names.sort();
                names.dedup();
                names
            }
            // Hash routes cannot reason about ranges.
            KeyPredicate::Range { .. } => candidates.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> LookupShardRoute {
        LookupShardRoute::new(
            "Order",
            [
                (ShardValue::from("A"), "dsA".to_string()),
                (ShardValue::from("B"), "dsB".to_string()),
            ],
        )
    }

    #[test]
    fn test_lookup_route_value() {
        assert_eq!(lookup().route_value(&ShardValue::from("B")).unwrap(), "dsB");
    }

    #[test]
    fn test_lookup_unmapped_value_fails() {
        let err = lookup().route_value(&ShardValue::from("Z")).unwrap_err();
        assert!(matches!(err, ShardingError::UnmappedShardKeyValue { .. }));
    }

    #[test]
    fn test_lookup_prunes_in_predicate() {
        let candidates = vec!["dsA".to_string(), "dsB".to_string(), "dsC".to_string()];
        let included = lookup().route_predicate(
            &KeyPredicate::In(vec![ShardValue::from("A"), ShardValue::from("Z")]),
            &candidates,
        );
        assert_eq!(included, vec!["dsA"]);
    }

    #[test]
    fn test_lookup_range_keeps_all_candidates() {
        let candidates = vec!["dsA".to_string(), "dsB".to_string()];
        let included = lookup().route_predicate(
            &KeyPredicate::Range {
                min: None,
                max: Some(ShardValue::from("B")),
            },
            &candidates,
        );
        assert_eq!(included, candidates);
    }

    #[test]
    fn test_hash_route_deterministic() {
        let route = HashShardRoute::new(
            "Order",
            vec!["ds0".to_string(), "ds1".to_string(), "ds2".to_string()],
        );
        let value = ShardValue::Int(42);
        assert_eq!(
            route.route_value(&value).unwrap(),
            route.route_value(&value).unwrap()
        );
    }

    #[test]
    fn test_hash_route_within_names() {
        let names = vec!["ds0".to_string(), "ds1".to_string(), "ds2".to_string()];
        let route = HashShardRoute::new("Order", names.clone());
        for i in 0..50 {
            let name = route.route_value(&ShardValue::Int(i)).unwrap();
            assert!(names.contains(&name));
        }
    }

    #[test]
    fn test_hash_route_null_fails() {
        let route = HashShardRoute::new("Order", vec!["ds0".to_string()]);
        assert!(route.route_value(&ShardValue::Null).is_err());
    }

    #[test]
    fn test_hash_route_eq_predicate_pins_one_target() {
        let names = vec!["ds0".to_string(), "ds1".to_string(), "ds2".to_string()];
        let route = HashShardRoute::new("Order", names.clone());
        let included = route.route_predicate(&KeyPredicate::Eq(ShardValue::Int(7)), &names);
        assert_eq!(included.len(), 1);
        assert_eq!(included[0], route.route_value(&ShardValue::Int(7)).unwrap());
    }
}
