//! Vector Store Seam
//!
//! Collections of documents with embeddings and a small set of indexed
//! metadata keys. The engine consumes this trait only; the bundled
//! implementations are an in-memory map (tests, ephemeral runs) and a
//! sqlite-backed store (durable runs). Both compute exact cosine scores.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// COLLECTIONS
// ============================================================================

/// The named collections of the memory graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Decisions,
    Threads,
    Patterns,
    Priming,
    Flags,
    Messages,
    Lineage,
    Scans,
}

impl Collection {
    /// Collections the attention engine fans out across.
    pub const RECALL: [Collection; 6] = [
        Collection::Decisions,
        Collection::Threads,
        Collection::Priming,
        Collection::Patterns,
        Collection::Messages,
        Collection::Flags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Decisions => "decisions",
            Collection::Threads => "threads",
            Collection::Patterns => "patterns",
            Collection::Priming => "priming",
            Collection::Flags => "flags",
            Collection::Messages => "messages",
            Collection::Lineage => "lineage",
            Collection::Scans => "scans",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decisions" => Some(Collection::Decisions),
            "threads" => Some(Collection::Threads),
            "patterns" => Some(Collection::Patterns),
            "priming" => Some(Collection::Priming),
            "flags" => Some(Collection::Flags),
            "messages" => Some(Collection::Messages),
            "lineage" => Some(Collection::Lineage),
            "scans" => Some(Collection::Scans),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RECORDS AND FILTERS
// ============================================================================

/// The derived copy of a record held by the store: surface text, embedding,
/// the indexed metadata slice, and the registry's full payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    pub project: String,
    pub text: String,
    /// Unit vector, or empty for non-embedded kinds (lineage edges, scans).
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Full registry record, serialized.
    pub payload: Value,
}

/// Conjunctive equality filter over the indexed metadata keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
}

impl SearchFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_project(project: impl Into<String>) -> Self {
        Self { project: Some(project.into()), ..Self::default() }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_source_conversation(mut self, conversation: impl Into<String>) -> Self {
        self.source_conversation = Some(conversation.into());
        self
    }

    /// Whether a record passes every set clause.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        if let Some(p) = &self.project {
            if &record.project != p {
                return false;
            }
        }
        if let Some(s) = &self.status {
            if record.status.as_deref() != Some(s.as_str()) {
                return false;
            }
        }
        if let Some(c) = &self.category {
            if record.category.as_deref() != Some(c.as_str()) {
                return false;
            }
        }
        if let Some(sc) = &self.source_conversation {
            if record.source_conversation.as_deref() != Some(sc.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One search result: cosine score in `[-1, 1]` plus the stored record.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub record: StoredRecord,
}

// ============================================================================
// THE TRAIT
// ============================================================================

/// Document + vector storage for one engine instance.
///
/// `upsert` is idempotent on id. `search` returns cosine scores sorted
/// descending, ties broken by id ascending so results are deterministic.
/// There are no cross-collection operations at this layer.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: Collection, record: StoredRecord) -> Result<()>;

    async fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>>;

    /// Returns true when a record was removed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    /// Records matching the filter, newest first (ties by id ascending).
    /// `limit = 0` means no limit.
    async fn list(
        &self,
        collection: Collection,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<StoredRecord>>;

    async fn count(&self, collection: Collection, filter: &SearchFilter) -> Result<usize>;

    /// Distinct projects across all collections with their record counts,
    /// sorted by project name.
    async fn projects(&self) -> Result<Vec<(String, usize)>>;
}

/// Sort a candidate list into the canonical search order.
pub(crate) fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Sort records into the canonical list order: newest first, id ascending.
pub(crate) fn sort_records(records: &mut [StoredRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
