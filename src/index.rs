//! Product index schema and idempotent index creation.

use std::sync::Arc;

use crate::store::{
    DistanceMetric, FieldKind, IndexSchema, SchemaField, StoreError, VectorAlgorithm, VectorStore,
    VectorType,
};

/// Default index name.
pub const DEFAULT_INDEX_NAME: &str = "products_idx";

/// Default key prefix for product documents.
pub const DEFAULT_KEY_PREFIX: &str = "product:";

/// JSON path of the embedding field.
pub const VECTOR_FIELD: &str = "$.effect_vector";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index probe failed: {0}")]
    Probe(#[source] StoreError),

    #[error("Index creation failed: {0}")]
    Creation(#[source] StoreError),
}

/// What `ensure_index` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyPresent,
}

/// Schema for product documents with a `dimensions`-wide embedding.
pub fn product_schema(name: &str, prefix: &str, dimensions: usize) -> IndexSchema {
    IndexSchema {
        name: name.to_string(),
        prefix: prefix.to_string(),
        fields: vec![
            SchemaField {
                path: "$.name".to_string(),
                kind: FieldKind::Text { sortable: true },
            },
            SchemaField {
                path: "$.brand".to_string(),
                kind: FieldKind::Tag,
            },
            SchemaField {
                path: "$.category".to_string(),
                kind: FieldKind::Tag,
            },
            SchemaField {
                path: "$.effects".to_string(),
                kind: FieldKind::Text { sortable: false },
            },
            SchemaField {
                path: VECTOR_FIELD.to_string(),
                kind: FieldKind::Vector {
                    algorithm: VectorAlgorithm::Hnsw,
                    dim: dimensions,
                    metric: DistanceMetric::Cosine,
                    element: VectorType::Float32,
                },
            },
        ],
    }
}

pub struct IndexManager {
    store: Arc<dyn VectorStore>,
}

impl IndexManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Create the index unless it already exists.
    ///
    /// An existing index is left untouched, even if its schema differs.
    /// Losing a creation race to another caller counts as success.
    pub fn ensure_index(&self, schema: &IndexSchema) -> Result<EnsureOutcome, IndexError> {
        if let Some(info) = self.store.index_info(&schema.name).map_err(IndexError::Probe)? {
            if info.schema != *schema {
                log::warn!(
                    "Index '{}' exists with a different schema; leaving it unchanged",
                    schema.name
                );
            } else {
                log::debug!("Index '{}' already exists", schema.name);
            }
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        match self.store.create_index(schema) {
            Ok(()) => {
                log::info!("Search index '{}' created", schema.name);
                Ok(EnsureOutcome::Created)
            }
            Err(StoreError::IndexAlreadyExists(_)) => {
                log::info!("Search index '{}' already exists", schema.name);
                Ok(EnsureOutcome::AlreadyPresent)
            }
            Err(e) => {
                log::error!("Error creating index '{}': {e}", schema.name);
                Err(IndexError::Creation(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IndexInfo, KnnQuery, MemoryStore, ScoredDocument};
    use serde_json::Value;

    /// Reports "absent" on probe but "already exists" on create, as when
    /// another process wins the race between the two calls.
    struct RacingStore;

    impl VectorStore for RacingStore {
        fn index_info(&self, _name: &str) -> Result<Option<IndexInfo>, StoreError> {
            Ok(None)
        }

        fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
            Err(StoreError::IndexAlreadyExists(schema.name.clone()))
        }

        fn get_json(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }

        fn set_json(&self, _key: &str, _doc: &Value) -> Result<(), StoreError> {
            Ok(())
        }

        fn count(&self, index: &str) -> Result<usize, StoreError> {
            Err(StoreError::UnknownIndex(index.to_string()))
        }

        fn knn(&self, index: &str, _query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError> {
            Err(StoreError::UnknownIndex(index.to_string()))
        }
    }

    struct BrokenStore;

    impl VectorStore for BrokenStore {
        fn index_info(&self, _name: &str) -> Result<Option<IndexInfo>, StoreError> {
            Ok(None)
        }

        fn create_index(&self, _schema: &IndexSchema) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        fn get_json(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }

        fn set_json(&self, _key: &str, _doc: &Value) -> Result<(), StoreError> {
            Ok(())
        }

        fn count(&self, _index: &str) -> Result<usize, StoreError> {
            Ok(0)
        }

        fn knn(&self, _index: &str, _query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_product_schema_fields() {
        let schema = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 128);

        assert_eq!(schema.fields.len(), 5);
        let (_, dim) = schema.vector_field(VECTOR_FIELD).unwrap();
        assert_eq!(dim, 128);
        assert_eq!(
            schema.fields[0].kind,
            FieldKind::Text { sortable: true }
        );
        assert_eq!(schema.fields[1].kind, FieldKind::Tag);
        assert_eq!(schema.fields[2].kind, FieldKind::Tag);
    }

    #[test]
    fn test_ft_create_args() {
        let args = product_schema("products_idx", "product:", 128).to_ft_create_args();
        let joined = args.join(" ");

        assert_eq!(
            joined,
            "products_idx ON JSON PREFIX 1 product: SCHEMA \
             $.name TEXT SORTABLE $.brand TAG $.category TAG $.effects TEXT \
             $.effect_vector VECTOR HNSW 6 TYPE FLOAT32 DIM 128 DISTANCE_METRIC COSINE"
        );
    }

    #[test]
    fn test_ensure_twice_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store.clone());
        let schema = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 8);

        assert_eq!(manager.ensure_index(&schema).unwrap(), EnsureOutcome::Created);
        assert_eq!(
            manager.ensure_index(&schema).unwrap(),
            EnsureOutcome::AlreadyPresent
        );

        let info = store.index_info(DEFAULT_INDEX_NAME).unwrap().unwrap();
        assert_eq!(info.schema, schema);
    }

    #[test]
    fn test_existing_schema_is_not_altered() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store.clone());
        let original = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 8);
        let wider = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 16);

        manager.ensure_index(&original).unwrap();
        assert_eq!(
            manager.ensure_index(&wider).unwrap(),
            EnsureOutcome::AlreadyPresent
        );
        assert_eq!(
            store.index_info(DEFAULT_INDEX_NAME).unwrap().unwrap().schema,
            original
        );
    }

    #[test]
    fn test_lost_race_is_success() {
        let manager = IndexManager::new(Arc::new(RacingStore));
        let schema = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 8);

        assert_eq!(
            manager.ensure_index(&schema).unwrap(),
            EnsureOutcome::AlreadyPresent
        );
    }

    #[test]
    fn test_other_creation_failure_propagates() {
        let manager = IndexManager::new(Arc::new(BrokenStore));
        let schema = product_schema(DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX, 8);

        assert!(matches!(
            manager.ensure_index(&schema),
            Err(IndexError::Creation(StoreError::Backend(_)))
        ));
    }
}
