//! Primary embedding model backed by fastembed.
//!
//! - Model download into a configurable cache directory
//! - Dimension probing on load
//! - `TextEncoder` implementation used by the embedding service

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{EmbeddingError, TextEncoder};

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load the named model, downloading it into `cache_dir/models` if needed.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(false);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        log::info!("Embedding model '{model_name}' loaded ({dimensions} dimensions)");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Native output dimensions of the model, before reshaping.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Check a model name without loading anything.
    pub fn validate_name(name: &str) -> Result<(), EmbeddingError> {
        Self::parse_model_name(name).map(|_| ())
    }

    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, all-MiniLM-L6-v2-q, bge-small-en-v1.5, bge-base-en-v1.5",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl TextEncoder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}
