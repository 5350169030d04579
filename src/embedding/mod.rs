//! Text embedding for catalog effects and user profiles.
//!
//! # Architecture
//!
//! - `model`: fastembed-backed primary encoder
//! - `fallback`: deterministic SHA-256 hash embedding
//! - `service`: load-once primary model with fallback degradation

mod fallback;
pub mod model;
mod service;

pub use fallback::hash_embedding;
pub use model::EmbeddingModel;
pub use service::{
    Embedding, EmbeddingPath, EmbeddingService, FallbackReason, ModelLoader, PrimaryState,
};

/// Default primary model name.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding dimensionality, shared by the index schema.
pub const DEFAULT_DIMENSIONS: usize = 128;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// A frozen feature extractor that turns text into raw model output.
pub trait TextEncoder: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
