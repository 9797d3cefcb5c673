//! In-memory metadata provider.
//!
//! Entity registration happens at startup; reads are concurrent.

use crate::domain::EntityMetadata;
use crate::ports::outbound::MetadataProvider;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Metadata provider backed by a map.
#[derive(Default)]
pub struct InMemoryMetadataProvider {
    entities: RwLock<HashMap<String, EntityMetadata>>,
}

impl InMemoryMetadataProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an entity's metadata.
    pub fn register(&self, metadata: EntityMetadata) {
        self.entities
            .write()
            .insert(metadata.entity.clone(), metadata);
    }
}

impl MetadataProvider for InMemoryMetadataProvider {
    fn metadata(&self, entity: &str) -> Option<EntityMetadata> {
        self.entities.read().get(entity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShardingCapability;

    #[test]
    fn test_register_and_lookup() {
        let provider = InMemoryMetadataProvider::new();
        provider.register(EntityMetadata {
            entity: "Order".to_string(),
            capability: ShardingCapability::Both,
            data_source_property: Some("Area".to_string()),
            table_property: Some("Month".to_string()),
            multi_data_source: true,
            multi_table: true,
            single_key: true,
            primary_key: "Id".to_string(),
        });

        assert_eq!(provider.capability("Order"), ShardingCapability::Both);
        assert_eq!(provider.capability("Missing"), ShardingCapability::None);
        assert!(provider.metadata("Order").is_some());
    }
}
