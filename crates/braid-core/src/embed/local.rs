//! Local ONNX Embeddings
//!
//! fastembed-backed implementation of [`Embedder`]. The model is loaded
//! once into a process-wide `OnceLock`; fastembed's API needs `&mut self`,
//! so calls serialize through a `Mutex` the way the model host expects.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{normalize, Embedder, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};
use crate::error::{MemoryError, Result};

/// Model identifier reported by [`LocalEmbedder`].
pub const LOCAL_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

static EMBEDDING_MODEL_RESULT: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> =
    OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "braid", "braid") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("failed to create embedding cache directory {:?}: {}", cache_dir, e);
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize {LOCAL_EMBEDDING_MODEL}: {e}"))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| MemoryError::Unavailable(format!("embedding model lock poisoned: {e}"))),
        Err(err) => Err(MemoryError::Unavailable(err.clone())),
    }
}

/// Truncate a learned vector to the shared engine dimensionality.
///
/// Matryoshka-trained models put the representation in the leading
/// components, so the first N dims are the N-dim embedding.
fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    vector.truncate(EMBEDDING_DIMENSIONS);
    normalize(&mut vector);
    vector
}

/// Embedder backed by a local fastembed ONNX model.
#[derive(Debug, Clone, Default)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn validate(text: &str, index: Option<usize>) -> Result<()> {
        let label = |msg: String| match index {
            Some(i) => MemoryError::InvalidArgument(format!("batch index {i}: {msg}")),
            None => MemoryError::InvalidArgument(msg),
        };
        if text.trim().is_empty() {
            return Err(label("cannot embed empty text".to_string()));
        }
        if text.len() > MAX_TEXT_LENGTH {
            return Err(label(format!(
                "text of {} bytes exceeds the {MAX_TEXT_LENGTH}-byte embedding limit",
                text.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Self::validate(text, None)?;
        let mut guard = model()?;
        let vectors = guard
            .embed(vec![text.to_string()], None)
            .map_err(|e| MemoryError::Unavailable(format!("embedding failed: {e}")))?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Unavailable("model returned no vector".to_string()))?;
        Ok(matryoshka_truncate(vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for (index, text) in texts.iter().enumerate() {
            Self::validate(text, Some(index))?;
        }
        let mut guard = model()?;
        let vectors = guard
            .embed(texts.to_vec(), None)
            .map_err(|e| MemoryError::Unavailable(format!("batch embedding failed: {e}")))?;
        if vectors.len() != texts.len() {
            return Err(MemoryError::Unavailable(format!(
                "model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors.into_iter().map(matryoshka_truncate).collect())
    }

    fn model(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }
}
