//! Hashed N-gram Embedder
//!
//! A deterministic, dependency-free embedder: each word and character
//! trigram hashes to a signed slot in a 256-dimension vector, which is then
//! unit-normalized. Semantically crude next to a learned model, but stable
//! across runs and machines, which is what the registries' idempotence and
//! the recall determinism property need from the default build.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use super::{normalize, Embedder, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};
use crate::config::DEFAULT_EMBEDDING_MODEL;
use crate::error::{MemoryError, Result};

/// Deterministic hashing embedder. Cheap to construct, no model downloads.
#[derive(Debug, Clone, Default)]
pub struct HashedEmbedder;

impl HashedEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn feature_slot(feature: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let slot = (h % EMBEDDING_DIMENSIONS as u64) as usize;
        let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (slot, sign)
    }

    fn embed_sync(text: &str) -> Result<Vec<f32>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidArgument("cannot embed empty text".to_string()));
        }
        if trimmed.len() > MAX_TEXT_LENGTH {
            return Err(MemoryError::InvalidArgument(format!(
                "text of {} bytes exceeds the {MAX_TEXT_LENGTH}-byte embedding limit",
                trimmed.len()
            )));
        }

        let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for word in trimmed
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let (slot, sign) = Self::feature_slot(&word);
            vector[slot] += 2.0 * sign; // whole words carry more weight than trigrams

            let chars: Vec<char> = word.chars().collect();
            if chars.len() >= 3 {
                for tri in chars.windows(3) {
                    let gram: String = tri.iter().collect();
                    let (slot, sign) = Self::feature_slot(&gram);
                    vector[slot] += sign;
                }
            }
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Self::embed_sync(text)
    }

    fn model(&self) -> &str {
        DEFAULT_EMBEDDING_MODEL
    }
}

// ============================================================================
// TESTS
// ============================================================================
