//! Embedding Seam
//!
//! The engine consumes embeddings through the [`Embedder`] trait: a
//! fixed-dimension unit vector per text, deterministic for identical input,
//! order-preserving in batches. The built-in [`HashedEmbedder`] is always
//! available; a fastembed-backed implementation lives behind the
//! `embeddings` feature.

mod hashed;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
mod local;

pub use hashed::HashedEmbedder;

#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;

use async_trait::async_trait;

use crate::error::{MemoryError, Result};

/// Embedding dimensions shared by every collection.
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Maximum text length accepted by the built-in embedders.
pub const MAX_TEXT_LENGTH: usize = 8192;

/// Turns text into fixed-dimension unit vectors.
///
/// Guarantees required of every implementation:
/// - output has [`EMBEDDING_DIMENSIONS`] components and unit norm
/// - identical input yields an identical vector across runs
/// - `embed_batch` preserves input order
///
/// Transient provider failures surface as `unavailable` (the caller
/// retries with backoff); permanent failures (input too large) surface as
/// `invalid_argument` naming the offending index.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let vector = self.embed(text).await.map_err(|e| match e {
                MemoryError::InvalidArgument(msg) => {
                    MemoryError::InvalidArgument(format!("batch index {index}: {msg}"))
                }
                other => other,
            })?;
            out.push(vector);
        }
        Ok(out)
    }

    /// Model identifier, for stats and provenance.
    fn model(&self) -> &str;

    /// Output dimensionality.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Returns 0.0 on dimension mismatch or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Whether a vector is unit-norm within tolerance.
pub fn is_normalized(vector: &[f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() < 1e-3
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_mismatch_and_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!(is_normalized(&v));
        assert!((v[0] - 0.6).abs() < 1e-6);
    }
}
