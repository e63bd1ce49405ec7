//! The Recall Engine
//!
//! Embed once, fan out one search per collection, blend the factors into a
//! single attention score, sort with total order, pack to the token
//! budget, and return every score decomposed so callers can explain the
//! ranking. A failed collection degrades the response instead of failing
//! it, as long as at least one collection answered.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deadline::{self, Deadline};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::record::RecordKind;
use crate::retry::{self, RetryPolicy};
use crate::store::{Collection, SearchFilter, SearchHit, VectorStore};

use super::{AttentionWeights, CategoryBoosts, HeuristicTokenEstimator, TokenEstimator};

/// Token budget when the caller does not pass one.
pub const DEFAULT_BUDGET_TOKENS: usize = 2000;

/// Freshness half-life in days.
const FRESHNESS_HALF_LIFE_DAYS: f64 = 30.0;

/// Query-embedding cache entries.
const QUERY_CACHE_SIZE: usize = 256;

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// A recall call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<usize>,
    /// Conjunctive metadata filter applied to every collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilter>,
    #[serde(skip)]
    pub deadline: Option<Deadline>,
}

/// The decomposed attention score of one recalled item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFactors {
    /// Raw cosine mapped into `[0, 1]`.
    pub similarity: f64,
    pub epistemic_tier: f64,
    pub freshness: f64,
    pub conflict_bonus: f64,
    pub category_boost: f64,
}

/// One ranked, budget-packed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalledItem {
    pub id: String,
    pub kind: RecordKind,
    pub project: String,
    pub text: String,
    pub attention: f64,
    pub factors: ScoreFactors,
    pub tokens: usize,
}

/// The ranked payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    pub items: Vec<RecalledItem>,
    /// Collections that failed or timed out and were omitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
    pub budget_tokens: usize,
    pub tokens_used: usize,
    /// Candidates scored before packing.
    pub candidates: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Cross-collection recall with blended scoring and budget packing.
pub struct AttentionEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    weights: AttentionWeights,
    boosts: CategoryBoosts,
    estimator: Arc<dyn TokenEstimator>,
    retry: RetryPolicy,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl AttentionEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        weights: AttentionWeights,
    ) -> Self {
        Self::with_estimator(store, embedder, weights, Arc::new(HeuristicTokenEstimator))
    }

    pub fn with_estimator(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        weights: AttentionWeights,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            store,
            embedder,
            weights,
            boosts: CategoryBoosts::default(),
            estimator,
            retry: RetryPolicy::default(),
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    pub fn weights(&self) -> &AttentionWeights {
        &self.weights
    }

    /// Per-collection fetch depth: defaults to 20 and scales with budget.
    fn k_for_budget(budget_tokens: usize) -> usize {
        (budget_tokens / 50).clamp(20, 64)
    }

    /// Recall at the current wall-clock.
    pub async fn recall(&self, request: RecallRequest) -> Result<RecallResponse> {
        self.recall_at(request, Utc::now()).await
    }

    /// Recall with an explicit `now`, which pins the freshness factor.
    /// Given identical corpus, query, weights, and `now`, the output is
    /// identical.
    pub async fn recall_at(&self, request: RecallRequest, now: DateTime<Utc>) -> Result<RecallResponse> {
        if request.query.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("query cannot be empty".to_string()));
        }
        let budget_tokens = request.budget_tokens.unwrap_or(DEFAULT_BUDGET_TOKENS);
        if budget_tokens == 0 {
            return Err(MemoryError::InvalidArgument("budget must be positive".to_string()));
        }
        deadline::check(request.deadline)?;

        let query_vec = self.query_embedding(&request.query, request.deadline).await?;
        let filter = request.filters.clone().unwrap_or_default();
        let k = Self::k_for_budget(budget_tokens);

        // One outstanding search per collection.
        let searches = Collection::RECALL.iter().map(|&collection| {
            let store = Arc::clone(&self.store);
            let query_vec = query_vec.clone();
            let filter = filter.clone();
            let deadline = request.deadline;
            async move {
                let fut = store.search(collection, &query_vec, k, &filter);
                let outcome = match deadline {
                    Some(d) => match d.remaining() {
                        Some(left) => match tokio::time::timeout(left, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(MemoryError::DeadlineExceeded),
                        },
                        None => Err(MemoryError::DeadlineExceeded),
                    },
                    None => fut.await,
                };
                (collection, outcome)
            }
        });
        let outcomes = futures::future::join_all(searches).await;

        let mut degraded = Vec::new();
        let mut candidates: Vec<(Collection, SearchHit)> = Vec::new();
        for (collection, outcome) in outcomes {
            match outcome {
                Ok(hits) => candidates.extend(hits.into_iter().map(|h| (collection, h))),
                Err(err) => {
                    warn!(collection = collection.as_str(), error = %err, "collection omitted from recall");
                    degraded.push(collection.as_str().to_string());
                }
            }
        }

        if degraded.len() == Collection::RECALL.len() {
            // Nothing answered: surface the stronger error.
            if request.deadline.is_some_and(|d| d.expired()) {
                return Err(MemoryError::DeadlineExceeded);
            }
            return Err(MemoryError::Unavailable(
                "every recall collection failed".to_string(),
            ));
        }

        let total_candidates = candidates.len();
        let mut scored: Vec<RecalledItem> = candidates
            .into_iter()
            .filter_map(|(collection, hit)| self.score(collection, hit, now))
            .collect();

        // Total order: attention, then category prior, then id.
        scored.sort_by(|a, b| {
            b.attention
                .partial_cmp(&a.attention)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.factors
                        .category_boost
                        .partial_cmp(&a.factors.category_boost)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.id.cmp(&b.id))
        });

        let (items, tokens_used) = pack_to_budget(scored, budget_tokens);
        debug!(
            query = %request.query,
            candidates = total_candidates,
            selected = items.len(),
            tokens_used,
            "recall complete"
        );

        Ok(RecallResponse {
            items,
            degraded,
            budget_tokens,
            tokens_used,
            candidates: total_candidates,
        })
    }

    /// Embed the query, via the LRU cache. The bundled embedders are
    /// deterministic, so caching cannot change output ordering.
    async fn query_embedding(&self, query: &str, deadline: Option<Deadline>) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }
        let vector = retry::with_backoff("embed_query", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let query = query.to_string();
            async move { embedder.embed(&query).await }
        })
        .await?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    fn score(&self, collection: Collection, hit: SearchHit, now: DateTime<Utc>) -> Option<RecalledItem> {
        let kind = RecordKind::for_collection(collection)?;
        let record = hit.record;

        let similarity = (f64::from(hit.score) + 1.0) / 2.0;
        let similarity = similarity.clamp(0.0, 1.0);

        let epistemic_tier = record
            .payload
            .get("epistemicTier")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let age_days = (now - record.updated_at).num_seconds().max(0) as f64 / 86_400.0;
        let freshness = (-(std::f64::consts::LN_2) * age_days / FRESHNESS_HALF_LIFE_DAYS)
            .exp()
            .clamp(0.0, 1.0);

        let has_conflicts = record
            .payload
            .get("conflictsWith")
            .and_then(|v| v.as_array())
            .is_some_and(|a| !a.is_empty());
        let active = record.status.as_deref() == Some("active");
        let conflict_bonus = if has_conflicts && active { 1.0 } else { 0.0 };

        let category_boost = self.boosts.boost_max(&[kind]);

        let attention = self.weights.similarity * similarity
            + self.weights.epistemic_tier * epistemic_tier
            + self.weights.freshness * freshness
            + self.weights.conflict * conflict_bonus
            + self.weights.category * category_boost;

        let tokens = self.estimator.estimate(&record.text);

        Some(RecalledItem {
            id: record.id,
            kind,
            project: record.project,
            text: record.text,
            attention,
            factors: ScoreFactors {
                similarity,
                epistemic_tier,
                freshness,
                conflict_bonus,
                category_boost,
            },
            tokens,
        })
    }
}

/// Walk the sorted list, keeping items that fit the remaining budget. An
/// item that alone exceeds the budget is skipped, not truncated, so later
/// smaller items may still fit.
fn pack_to_budget(scored: Vec<RecalledItem>, budget_tokens: usize) -> (Vec<RecalledItem>, usize) {
    let mut items = Vec::new();
    let mut used = 0usize;
    for item in scored {
        if used + item.tokens <= budget_tokens {
            used += item.tokens;
            items.push(item);
        }
    }
    (items, used)
}

// ============================================================================
// TESTS
// ============================================================================
