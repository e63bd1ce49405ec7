//! # Braid Core
//!
//! Persistent semantic memory engine for LLM conversations. Braid ingests
//! what past sessions decided, left open, and noticed, and hands it back
//! through an attention-weighted recall engine:
//!
//! - **Attention recall**: one query fans out across every collection;
//!   candidates blend semantic similarity, epistemic tier, freshness,
//!   conflict pressure, and a category prior into a single salience score,
//!   packed to a token budget.
//! - **Decision registry**: two-signal conflict detection — embedding
//!   proximity confirmed by entity/intent divergence, so paraphrases never
//!   read as contradictions.
//! - **Thread registry**: open work with staleness measured in compression
//!   hops, not wall-clock.
//! - **Lineage graph**: the compression-edge DAG that carries decisions and
//!   threads across conversation boundaries and drives hop accounting.
//! - **Entanglement scanner**: cross-project clusters, bridges, and loose
//!   ends from embedding proximity.
//! - **Pattern store**: near-duplicate insertions merge with
//!   confidence accumulation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use braid_core::{Config, DecisionDraft, HashedEmbedder, MemoryService, MemoryVectorStore};
//!
//! let service = MemoryService::new(
//!     Arc::new(MemoryVectorStore::new()),
//!     Arc::new(HashedEmbedder::new()),
//!     Config::default(),
//! )?;
//!
//! let registered = service.decide(DecisionDraft {
//!     project: "atlas".into(),
//!     local_id: "D001".into(),
//!     text: "Use OAuth2 with refresh tokens".into(),
//!     ..DecisionDraft::default()
//! }, None).await?;
//!
//! let recalled = service.recall(braid_core::RecallRequest {
//!     query: "how do we authenticate?".into(),
//!     ..Default::default()
//! }).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings`: local ONNX embeddings via fastembed. The deterministic
//!   hashed n-gram embedder is always available and is the default.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod attention;
pub mod config;
pub mod conflict;
pub mod deadline;
pub mod embed;
pub mod entangle;
pub mod error;
pub mod events;
pub mod identity;
pub mod lineage;
pub mod pattern;
pub mod priming;
pub mod record;
pub mod registry;
pub mod retry;
pub mod scratchpad;
pub mod service;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use attention::{
    AttentionEngine, AttentionWeights, CategoryBoosts, HeuristicTokenEstimator, RecallRequest,
    RecallResponse, RecalledItem, ScoreFactors, TokenEstimator, DEFAULT_BUDGET_TOKENS,
};
pub use config::{Config, DEFAULT_EMBEDDING_MODEL};
pub use conflict::{ConflictDetector, ConflictVerdict, SEMANTIC_PROXIMITY_FLOOR};
pub use deadline::Deadline;
pub use embed::{cosine_similarity, Embedder, HashedEmbedder, EMBEDDING_DIMENSIONS};
pub use entangle::{
    Bridge, EntanglementCluster, EntanglementScanner, Resonance, ResonanceTier, ScanSnapshot,
    STRONG_RESONANCE, WEAK_RESONANCE,
};
pub use error::{MemoryError, Result};
pub use events::{EventKind, EventLog, EventRecord};
pub use lineage::{EdgeDraft, LineageEdge, LineageGraph, LineageTrace};
pub use pattern::{PatternOutcome, PatternStore, MERGE_SIMILARITY};
pub use priming::{FlagRegistry, PrimingDraft, PrimingRegistry};
pub use record::{
    DecisionRecord, DecisionStatus, ExpeditionFlag, FlagCategory, FlagStatus, MessageRecord,
    PatternRecord, PrimingBlock, Priority, RecordKind, Staleness, ThreadRecord, ThreadStatus,
    STALE_CRITICAL_HOPS, STALE_WARNING_HOPS,
};
pub use registry::{
    ConflictReport, DecisionDraft, DecisionRegistry, RegisteredDecision, ThreadDraft,
    ThreadRegistry,
};
pub use scratchpad::{Scratchpad, ScratchpadEntry};
pub use service::{Alerts, MemoryService, ProjectContext, ScopedHit, Stats};
pub use store::{
    Collection, MemoryVectorStore, SearchFilter, SearchHit, SqliteVectorStore, StoredRecord,
    VectorStore,
};

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub use embed::LocalEmbedder;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Alerts, AttentionWeights, Collection, Config, DecisionDraft, DecisionRecord, Deadline,
        EdgeDraft, Embedder, HashedEmbedder, MemoryError, MemoryService, MemoryVectorStore,
        ProjectContext, RecallRequest, RecallResponse, Result, SqliteVectorStore, ThreadDraft,
        ThreadRecord, VectorStore,
    };
}
