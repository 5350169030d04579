//! Vector math shared by the stores and the query path.
//!
//! The index reports cosine *distance*; callers only ever see similarity,
//! converted once with [`to_similarity`].

/// Errors that can occur when comparing vectors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SimilarityError {
    #[error("Dimension mismatch: left has {left}, right has {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero norm. The result is clamped to
/// [-1, 1] so rounding never pushes it out of range.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return Ok(0.0);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Cosine distance as the vector index reports it: `1 - similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    cosine_similarity(a, b).map(|s| 1.0 - s)
}

/// Convert a cosine distance returned by the index into a similarity score.
pub fn to_similarity(distance: f32) -> f32 {
    1.0 - distance
}
