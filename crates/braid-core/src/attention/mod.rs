//! Attention-Weighted Recall
//!
//! The hot path: one query fans out across every recall collection, each
//! candidate is scored by a weighted blend of semantic similarity,
//! epistemic confidence, temporal freshness, conflict pressure, and a
//! category prior, and the ranked list is packed to a token budget. The
//! blend weights are pure data; changing them changes no code path.

mod engine;
mod tokens;
mod weights;

pub use engine::{
    AttentionEngine, RecallRequest, RecallResponse, RecalledItem, ScoreFactors,
    DEFAULT_BUDGET_TOKENS,
};
pub use tokens::{HeuristicTokenEstimator, TokenEstimator};
pub use weights::{AttentionWeights, CategoryBoosts};
