//! In-process vector store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use super::{rank_documents, IndexInfo, IndexSchema, KnnQuery, ScoredDocument, StoreError, VectorStore};

/// Vector store held entirely in memory. Useful for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    indexes: RwLock<HashMap<String, IndexSchema>>,
    docs: RwLock<BTreeMap<String, Value>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(format!("Lock poisoned: {}", e))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held, indexed or not.
    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schema(&self, index: &str) -> Result<IndexSchema, StoreError> {
        self.indexes
            .read()
            .map_err(poisoned)?
            .get(index)
            .cloned()
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))
    }
}

impl VectorStore for MemoryStore {
    fn index_info(&self, name: &str) -> Result<Option<IndexInfo>, StoreError> {
        match self.schema(name) {
            Ok(schema) => {
                let num_docs = self.count(name)?;
                Ok(Some(IndexInfo { schema, num_docs }))
            }
            Err(StoreError::UnknownIndex(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        if indexes.contains_key(&schema.name) {
            return Err(StoreError::IndexAlreadyExists(schema.name.clone()));
        }
        indexes.insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set_json(&self, key: &str, doc: &Value) -> Result<(), StoreError> {
        self.docs
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), doc.clone());
        Ok(())
    }

    fn count(&self, index: &str) -> Result<usize, StoreError> {
        let schema = self.schema(index)?;
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.keys().filter(|k| k.starts_with(&schema.prefix)).count())
    }

    fn knn(&self, index: &str, query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError> {
        let schema = self.schema(index)?;
        let docs = self.docs.read().map_err(poisoned)?;
        rank_documents(
            &schema,
            docs.iter().map(|(k, v)| (k.clone(), v.clone())),
            query,
        )
    }
}
