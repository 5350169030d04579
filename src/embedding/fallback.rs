//! Deterministic hash embedding used when the primary model is unavailable.
//!
//! Lowercased text → SHA-256 → one coordinate per output dimension:
//! `sin(hash[i % 32] + i) * 0.5 + 0.5`, so every value lies in [0, 1].

use sha2::{Digest, Sha256};

/// Produce the fallback vector for `text` with `dimensions` coordinates.
///
/// Identical input always yields a byte-identical vector.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut hasher = Sha256::new();
    hasher.update(text.to_lowercase().as_bytes());
    let hash: [u8; 32] = hasher.finalize().into();

    (0..dimensions)
        .map(|i| {
            let byte = hash[i % hash.len()] as f64;
            ((byte + i as f64).sin() * 0.5 + 0.5) as f32
        })
        .collect()
}
