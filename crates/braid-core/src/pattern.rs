//! Pattern Store
//!
//! Recurring observations. A near-duplicate insertion merges into the
//! existing pattern instead of creating a new row: confidence accumulates
//! as `min(1, 0.7*existing + 0.3*incoming + 0.05)`, the merge count rises,
//! and the displaced phrasing is kept as a variant.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deadline::{self, Deadline};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::record::PatternRecord;
use crate::retry::{self, RetryPolicy};
use crate::store::{Collection, SearchFilter, VectorStore};

/// Similarity above which an incoming pattern merges into its neighbor.
pub const MERGE_SIMILARITY: f32 = 0.85;

/// Neighbors probed per insertion.
const MERGE_PROBE_K: usize = 5;

/// Outcome of a pattern registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternOutcome {
    pub pattern: PatternRecord,
    /// True when the insertion merged into an existing pattern.
    pub merged: bool,
    /// Similarity to the absorbed neighbor, when merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

/// Owner of the patterns collection.
pub struct PatternStore {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    retry: RetryPolicy,
}

impl PatternStore {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, events: Arc<EventLog>) -> Self {
        Self { store, embedder, events, retry: RetryPolicy::default() }
    }

    /// Insert a pattern, merging into the closest neighbor at or above
    /// [`MERGE_SIMILARITY`].
    pub async fn register(
        &self,
        project: &str,
        text: &str,
        confidence: Option<f64>,
        deadline: Option<Deadline>,
    ) -> Result<PatternOutcome> {
        if text.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("pattern text cannot be empty".to_string()));
        }
        let incoming = confidence.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&incoming) {
            return Err(MemoryError::InvalidArgument(format!(
                "confidence must be in [0, 1], got {incoming}"
            )));
        }
        deadline::check(deadline)?;

        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let text = text.to_string();
            async move { embedder.embed(&text).await }
        })
        .await?;

        deadline::check(deadline)?;
        let neighbors = self
            .store
            .search(Collection::Patterns, &embedding, MERGE_PROBE_K, &SearchFilter::empty())
            .await?;

        if let Some(top) = neighbors.first() {
            if top.score >= MERGE_SIMILARITY {
                let mut existing = PatternRecord::from_stored(&top.record)?;
                existing.confidence =
                    (0.7 * existing.confidence + 0.3 * incoming + 0.05).min(1.0);
                existing.merge_count += 1;
                existing.last_merged_at = Some(Utc::now());
                if existing.text != text {
                    let displaced = std::mem::replace(&mut existing.text, text.to_string());
                    if !existing.variants.contains(&displaced) {
                        existing.variants.push(displaced);
                    }
                }
                existing.updated_at = Utc::now();

                // The surface text moved, so the stored embedding moves too.
                self.store
                    .upsert(Collection::Patterns, existing.to_stored(embedding)?)
                    .await?;
                self.events.append(EventKind::Write, "pattern.merge", vec![existing.id.clone()]);
                debug!(id = %existing.id, similarity = top.score, "pattern merged");
                return Ok(PatternOutcome {
                    pattern: existing,
                    merged: true,
                    similarity: Some(top.score),
                });
            }
        }

        let now = Utc::now();
        let pattern = PatternRecord {
            id: identity::record_id(Collection::Patterns.as_str(), project, text),
            project: project.to_string(),
            text: text.to_string(),
            confidence: incoming,
            merge_count: 0,
            last_merged_at: None,
            variants: Vec::new(),
            source_conversation: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert(Collection::Patterns, pattern.to_stored(embedding)?).await?;
        self.events.append(EventKind::Write, "pattern.register", vec![pattern.id.clone()]);
        Ok(PatternOutcome { pattern, merged: false, similarity: None })
    }

    pub async fn get(&self, id: &str) -> Result<PatternRecord> {
        let stored = self
            .store
            .get(Collection::Patterns, id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("pattern {id}")))?;
        PatternRecord::from_stored(&stored)
    }

    pub async fn list(&self, project: Option<&str>) -> Result<Vec<PatternRecord>> {
        let mut filter = SearchFilter::default();
        filter.project = project.map(str::to_string);
        let records = self.store.list(Collection::Patterns, &filter, 0).await?;
        records.iter().map(PatternRecord::from_stored).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashedEmbedder;
    use crate::store::MemoryVectorStore;

    fn store() -> PatternStore {
        PatternStore::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashedEmbedder::new()),
            Arc::new(EventLog::new()),
        )
    }

    #[tokio::test]
    async fn distinct_patterns_insert_separately() {
        let patterns = store();
        let a = patterns
            .register("atlas", "retries mask configuration errors", Some(0.4), None)
            .await
            .unwrap();
        let b = patterns
            .register("atlas", "watercolor herons prefer shallow water", Some(0.4), None)
            .await
            .unwrap();
        assert!(!a.merged);
        assert!(!b.merged);
        assert_ne!(a.pattern.id, b.pattern.id);
    }

    #[tokio::test]
    async fn identical_text_merges_and_converges_to_full_confidence() {
        let patterns = store();
        let first = patterns
            .register("atlas", "retries mask configuration errors", Some(0.9), None)
            .await
            .unwrap();
        assert!(!first.merged);

        // With incoming confidence c, merges converge to min(1, c + 1/6).
        let mut confidence = first.pattern.confidence;
        let mut last_merge_count = 0;
        for _ in 0..30 {
            let outcome = patterns
                .register("atlas", "retries mask configuration errors", Some(0.9), None)
                .await
                .unwrap();
            assert!(outcome.merged);
            assert!(outcome.pattern.merge_count > last_merge_count, "merge count strictly increases");
            assert!(outcome.pattern.confidence >= confidence, "confidence never drops");
            confidence = outcome.pattern.confidence;
            last_merge_count = outcome.pattern.merge_count;
        }
        assert!((confidence - 1.0).abs() < 1e-9, "confidence converges to 1, got {confidence}");
    }

    #[tokio::test]
    async fn merge_preserves_displaced_text_as_variant() {
        let patterns = store();
        patterns
            .register("atlas", "retries mask configuration errors in deploys", Some(0.5), None)
            .await
            .unwrap();
        let outcome = patterns
            .register("atlas", "retries mask configuration errors in deployments", Some(0.5), None)
            .await
            .unwrap();
        if outcome.merged {
            assert_eq!(outcome.pattern.text, "retries mask configuration errors in deployments");
            assert!(outcome
                .pattern
                .variants
                .contains(&"retries mask configuration errors in deploys".to_string()));
        }
    }

    #[tokio::test]
    async fn confidence_is_validated() {
        let patterns = store();
        let err = patterns.register("atlas", "text", Some(1.5), None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        let err = patterns.register("atlas", "  ", Some(0.5), None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
