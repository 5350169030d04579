//! Shared fixtures for scenario tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{parse_catalog, CatalogError, CatalogRecord, CatalogSource};
use crate::store::{
    IndexInfo, IndexSchema, KnnQuery, MemoryStore, ScoredDocument, StoreError, VectorStore,
};

/// Catalog returning a fixed payload and counting fetches.
pub struct StubCatalog {
    payload: Value,
    fetches: Arc<AtomicUsize>,
}

impl StubCatalog {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

impl CatalogSource for StubCatalog {
    fn fetch(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        parse_catalog(self.payload.clone())
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

/// Memory store that refuses writes to one key.
pub struct FailingStore {
    inner: MemoryStore,
    fail_key: String,
}

impl FailingStore {
    pub fn new(fail_key: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_key: fail_key.to_string(),
        }
    }
}

impl VectorStore for FailingStore {
    fn index_info(&self, name: &str) -> Result<Option<IndexInfo>, StoreError> {
        self.inner.index_info(name)
    }

    fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
        self.inner.create_index(schema)
    }

    fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get_json(key)
    }

    fn set_json(&self, key: &str, doc: &Value) -> Result<(), StoreError> {
        if key == self.fail_key {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.inner.set_json(key, doc)
    }

    fn count(&self, index: &str) -> Result<usize, StoreError> {
        self.inner.count(index)
    }

    fn knn(&self, index: &str, query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError> {
        self.inner.knn(index, query)
    }
}

/// Vector stored under `key`, as f32.
pub fn stored_vector(store: &dyn VectorStore, key: &str) -> Vec<f32> {
    let doc = store.get_json(key).unwrap().expect("document exists");
    doc["effect_vector"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap() as f32)
        .collect()
}
