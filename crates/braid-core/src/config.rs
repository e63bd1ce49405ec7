//! Engine Configuration
//!
//! Environment-driven settings, parsed once at startup:
//!
//! - `BRAID_DB_PATH` (alias `VECTOR_DB_URI`) — sqlite database location
//!   (platform data dir otherwise)
//! - `EMBEDDING_MODEL` — embedding model name (informational for the hashed
//!   embedder, selects the fastembed model when the `embeddings` feature is on)
//! - `EMBEDDING_API_KEY` — forwarded to remote embedder implementations
//! - `ATTENTION_WEIGHTS` — JSON override for the recall blend, e.g.
//!   `{"similarity":0.5,"epistemicTier":0.2,"freshness":0.1,"conflict":0.1,"category":0.1}`

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::attention::AttentionWeights;
use crate::error::{MemoryError, Result};

/// Default model name reported by the built-in hashed embedder.
pub const DEFAULT_EMBEDDING_MODEL: &str = "braid/hashed-ngram-v1";

/// Runtime configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the sqlite database. `None` means in-memory only.
    pub db_path: Option<PathBuf>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// API key for remote embedding providers, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_api_key: Option<String>,
    /// Recall blend weights.
    pub attention_weights: AttentionWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_api_key: None,
            attention_weights: AttentionWeights::default(),
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    ///
    /// Fails on a malformed `ATTENTION_WEIGHTS` override rather than
    /// silently falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let db_path = std::env::var("BRAID_DB_PATH")
            .or_else(|_| std::env::var("VECTOR_DB_URI"))
            .ok()
            .map(PathBuf::from);

        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let embedding_api_key = std::env::var("EMBEDDING_API_KEY").ok().filter(|k| !k.is_empty());

        let attention_weights = match std::env::var("ATTENTION_WEIGHTS") {
            Ok(raw) if !raw.trim().is_empty() => {
                let weights: AttentionWeights = serde_json::from_str(&raw).map_err(|e| {
                    MemoryError::InvalidArgument(format!("ATTENTION_WEIGHTS is not valid JSON: {e}"))
                })?;
                weights.validate()?;
                weights
            }
            _ => AttentionWeights::default(),
        };

        Ok(Self {
            db_path,
            embedding_model,
            embedding_api_key,
            attention_weights,
        })
    }

    /// Default on-disk database path under the platform data directory.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "braid", "braid").ok_or_else(|| {
            MemoryError::Internal("could not determine project directories".to_string())
        })?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| MemoryError::Internal(format!("create data dir: {e}")))?;
        Ok(data_dir.join("braid.db"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_default_weights() {
        let config = Config::default();
        assert!(config.attention_weights.validate().is_ok());
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn weights_override_parses() {
        let raw = r#"{"similarity":0.5,"epistemicTier":0.2,"freshness":0.1,"conflict":0.1,"category":0.1}"#;
        let weights: AttentionWeights = serde_json::from_str(raw).unwrap();
        assert!(weights.validate().is_ok());
        assert!((weights.similarity - 0.5).abs() < f64::EPSILON);
    }
}
