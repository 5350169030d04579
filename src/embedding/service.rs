//! Embedding service: primary model with a deterministic fallback.
//!
//! The primary model is loaded lazily on the first `embed` call and the
//! outcome is kept for the lifetime of the service. A failed load is never
//! retried; every later call goes straight to the hash fallback.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::fallback::hash_embedding;
use super::model::EmbeddingModel;
use super::{EmbeddingError, TextEncoder};
use crate::similarity::l2_norm;

/// Loads the primary encoder. Called at most once per service.
pub type ModelLoader =
    Box<dyn Fn() -> Result<Arc<dyn TextEncoder>, EmbeddingError> + Send + Sync>;

/// Which path produced an embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingPath {
    Primary,
    Fallback(FallbackReason),
}

/// Why the fallback path was taken.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// Primary model turned off in configuration.
    Disabled,
    /// The one load attempt failed.
    ModelUnavailable(String),
    /// The model was loaded but failed on this input.
    InferenceFailed(String),
}

/// A vector of exactly `dimensions` coordinates plus the path that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub path: EmbeddingPath,
}

impl Embedding {
    pub fn is_fallback(&self) -> bool {
        matches!(self.path, EmbeddingPath::Fallback(_))
    }
}

/// Observable state of the primary model.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryState {
    Disabled,
    NotLoaded,
    Loaded(String),
    Unavailable(String),
}

pub struct EmbeddingService {
    dimensions: usize,
    loader: Option<ModelLoader>,
    primary: OnceCell<Result<Arc<dyn TextEncoder>, String>>,
}

impl EmbeddingService {
    /// Create a service that loads its primary encoder with `loader`.
    pub fn new<F>(dimensions: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextEncoder>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            dimensions,
            loader: Some(Box::new(loader)),
            primary: OnceCell::new(),
        }
    }

    /// Create a service that always uses the hash fallback.
    pub fn fallback_only(dimensions: usize) -> Self {
        Self {
            dimensions,
            loader: None,
            primary: OnceCell::new(),
        }
    }

    /// Create a service whose primary encoder is a fastembed model.
    pub fn with_fastembed(model_name: &str, cache_dir: PathBuf, dimensions: usize) -> Self {
        let model_name = model_name.to_string();
        Self::new(dimensions, move || {
            let model = EmbeddingModel::new(&model_name, cache_dir.clone())?;
            Ok(Arc::new(model) as Arc<dyn TextEncoder>)
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn primary_state(&self) -> PrimaryState {
        if self.loader.is_none() {
            return PrimaryState::Disabled;
        }
        match self.primary.get() {
            None => PrimaryState::NotLoaded,
            Some(Ok(encoder)) => PrimaryState::Loaded(encoder.name().to_string()),
            Some(Err(message)) => PrimaryState::Unavailable(message.clone()),
        }
    }

    /// Embed arbitrary text. Never fails: any primary-path problem degrades
    /// to the hash fallback and is reported through `Embedding::path`.
    pub fn embed(&self, text: &str) -> Embedding {
        let reason = match self.primary() {
            Ok(encoder) => match encoder
                .encode(text)
                .and_then(|raw| reshape(raw, self.dimensions))
            {
                Ok(vector) => {
                    return Embedding {
                        vector,
                        path: EmbeddingPath::Primary,
                    }
                }
                Err(e) => {
                    log::error!("Embedding generation failed, using fallback: {e}");
                    FallbackReason::InferenceFailed(e.to_string())
                }
            },
            Err(reason) => reason,
        };

        Embedding {
            vector: hash_embedding(text, self.dimensions),
            path: EmbeddingPath::Fallback(reason),
        }
    }

    /// Embed a list of effect tags joined by single spaces.
    pub fn embed_effects<S: AsRef<str>>(&self, effects: &[S]) -> Embedding {
        let text = effects
            .iter()
            .map(|e| e.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        self.embed(&text)
    }

    /// Embed a user profile as `skin_type goals... conditions...`.
    pub fn embed_profile<S: AsRef<str>>(
        &self,
        goals: &[S],
        conditions: &[S],
        skin_type: &str,
    ) -> Embedding {
        let text = std::iter::once(skin_type)
            .chain(goals.iter().map(|g| g.as_ref()))
            .chain(conditions.iter().map(|c| c.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        self.embed(&text)
    }

    fn primary(&self) -> Result<&Arc<dyn TextEncoder>, FallbackReason> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(FallbackReason::Disabled);
        };

        let state = self.primary.get_or_init(|| match loader() {
            Ok(encoder) => Ok(encoder),
            Err(e) => {
                log::warn!("Could not load embedding model, using fallback: {e}");
                Err(e.to_string())
            }
        });

        state
            .as_ref()
            .map_err(|message| FallbackReason::ModelUnavailable(message.clone()))
    }
}

/// Fit raw model output to `dimensions` coordinates.
///
/// Output of the right length is kept as is. Otherwise coordinate `k` is
/// summed into bucket `k % dimensions` and the result is L2-normalized.
fn reshape(raw: Vec<f32>, dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
    if raw.is_empty() {
        return Err(EmbeddingError::EmbeddingFailed(
            "model returned an empty vector".to_string(),
        ));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::EmbeddingFailed(
            "model returned non-finite values".to_string(),
        ));
    }
    if raw.len() == dimensions || dimensions == 0 {
        return Ok(if dimensions == 0 { Vec::new() } else { raw });
    }

    let mut out = vec![0.0f32; dimensions];
    for (k, v) in raw.iter().enumerate() {
        out[k % dimensions] += v;
    }

    let norm = l2_norm(&out);
    if norm > f32::EPSILON {
        out.iter_mut().for_each(|x| *x /= norm);
    }
    Ok(out)
}
