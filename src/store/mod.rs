//! Vector store: JSON documents keyed by string, plus a KNN-capable index.
//!
//! The `VectorStore` trait mirrors what a RediSearch/RedisJSON deployment
//! offers: index info/create, per-key JSON get/set, a match-all count and
//! KNN over a vector field with a cosine-distance `score`.
//!
//! - `memory`: in-process store
//! - `local`: file-backed store on top of `storage::BackendLocal`

mod local;
mod memory;
pub mod schema;

use serde_json::{Map, Value};

use crate::similarity::cosine_distance;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use schema::{
    DistanceMetric, FieldKind, IndexSchema, SchemaField, VectorAlgorithm, VectorType,
};

/// Errors reported by a vector store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Unknown vector field: {0}")]
    UnknownField(String),

    #[error("Dimension mismatch: index expects {expected}, query has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Index metadata returned by an info probe.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub schema: IndexSchema,
    pub num_docs: usize,
}

/// Approximate nearest-neighbor request against a vector field.
#[derive(Debug, Clone)]
pub struct KnnQuery {
    /// JSON path of the vector field, e.g. `$.effect_vector`.
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
    /// Top-level document fields to return alongside the score.
    pub return_fields: Vec<String>,
}

/// One KNN hit. `score` is the cosine distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub key: String,
    pub fields: Map<String, Value>,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    /// `Ok(None)` when the index does not exist.
    fn index_info(&self, name: &str) -> Result<Option<IndexInfo>, StoreError>;

    /// Fails with `IndexAlreadyExists` if an index with that name exists.
    fn create_index(&self, schema: &IndexSchema) -> Result<(), StoreError>;

    fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the whole document at `key`. Last write wins.
    fn set_json(&self, key: &str, doc: &Value) -> Result<(), StoreError>;

    /// Number of indexed documents. Fails with `UnknownIndex` if absent.
    fn count(&self, index: &str) -> Result<usize, StoreError>;

    /// Nearest documents ordered by ascending distance.
    fn knn(&self, index: &str, query: &KnnQuery) -> Result<Vec<ScoredDocument>, StoreError>;
}

/// Exhaustive KNN used by the bundled stores.
///
/// Documents outside the schema prefix, or whose vector is missing or has
/// the wrong length, are not indexed and never match.
pub(crate) fn rank_documents<I>(
    schema: &IndexSchema,
    docs: I,
    query: &KnnQuery,
) -> Result<Vec<ScoredDocument>, StoreError>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let (field, dim) = schema
        .vector_field(&query.field)
        .ok_or_else(|| StoreError::UnknownField(query.field.clone()))?;

    if query.vector.len() != dim {
        return Err(StoreError::DimensionMismatch {
            expected: dim,
            got: query.vector.len(),
        });
    }

    let vector_name = field.field_name().to_string();

    let mut results: Vec<ScoredDocument> = docs
        .into_iter()
        .filter(|(key, _)| key.starts_with(&schema.prefix))
        .filter_map(|(key, doc)| {
            let vector = read_vector(doc.get(&vector_name)?, dim)?;
            let score = cosine_distance(&query.vector, &vector).ok()?;
            let fields = query
                .return_fields
                .iter()
                .filter_map(|name| doc.get(name).map(|v| (name.clone(), v.clone())))
                .collect();
            Some(ScoredDocument { key, fields, score })
        })
        .collect();

    results.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    results.truncate(query.k);

    Ok(results)
}

fn read_vector(value: &Value, dim: usize) -> Option<Vec<f32>> {
    let values = value.as_array()?;
    if values.len() != dim {
        return None;
    }
    values.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
}
