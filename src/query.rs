//! Nearest-neighbor product lookup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::embedding::EmbeddingService;
use crate::index::VECTOR_FIELD;
use crate::similarity::to_similarity;
use crate::store::{KnnQuery, ScoredDocument, StoreError, VectorStore};

/// Fields requested back from the index for each hit.
const RETURN_FIELDS: [&str; 5] = ["product_id", "name", "brand", "category", "effects"];

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("vector search failed: {0}")]
    Store(#[from] StoreError),

    #[error("malformed search result {key}: {reason}")]
    MalformedResult { key: String, reason: String },
}

/// A ranked match. `similarity` is `1 - cosine distance`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarProduct {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub effects: Vec<String>,
    pub similarity: f32,
}

/// Questionnaire answers used to build a query vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub skin_type: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
}

pub struct QueryService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<EmbeddingService>,
    index_name: String,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<EmbeddingService>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            index_name: index_name.into(),
        }
    }

    /// Up to `limit` products closest to `vector`, most similar first.
    pub fn try_find_similar(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarProduct>, QueryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = KnnQuery {
            field: VECTOR_FIELD.to_string(),
            vector: vector.to_vec(),
            k: limit,
            return_fields: RETURN_FIELDS.iter().map(|f| f.to_string()).collect(),
        };

        let mut results = self
            .store
            .knn(&self.index_name, &query)?
            .into_iter()
            .map(to_similar_product)
            .collect::<Result<Vec<_>, _>>()?;

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Same as `try_find_similar`, but a failed search yields an empty list.
    pub fn find_similar(&self, vector: &[f32], limit: usize) -> Vec<SimilarProduct> {
        self.try_find_similar(vector, limit).unwrap_or_else(|e| {
            log::error!("Vector search failed: {e}");
            Vec::new()
        })
    }

    /// Embed a user profile and look up its nearest products.
    pub fn find_for_profile(&self, profile: &UserProfile, limit: usize) -> Vec<SimilarProduct> {
        let embedding = self.embedder.embed_profile(
            profile.goals.as_slice(),
            profile.conditions.as_slice(),
            &profile.skin_type,
        );
        log::debug!("Profile query vector via {:?}", embedding.path);
        self.find_similar(&embedding.vector, limit)
    }
}

fn to_similar_product(doc: ScoredDocument) -> Result<SimilarProduct, QueryError> {
    let ScoredDocument { key, fields, score } = doc;

    if !score.is_finite() {
        return Err(QueryError::MalformedResult {
            key,
            reason: format!("score {score} is not a number"),
        });
    }

    let product_id = match fields.get("product_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(QueryError::MalformedResult {
                key,
                reason: "missing product_id".to_string(),
            })
        }
    };

    Ok(SimilarProduct {
        product_id,
        name: string_field(&fields, "name"),
        brand: string_field(&fields, "brand"),
        category: string_field(&fields, "category"),
        effects: effects_field(&fields),
        similarity: to_similarity(score),
    })
}

fn string_field(fields: &Map<String, Value>, name: &str) -> String {
    fields
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Effects come back as a list from JSON documents, but some index clients
/// flatten them into one comma-separated string.
fn effects_field(fields: &Map<String, Value>) -> Vec<String> {
    match fields.get("effects") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
