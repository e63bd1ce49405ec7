//! Record Model
//!
//! Every record kind shares a common header (id, project, text, timestamps,
//! source conversation) and carries kind-specific fields. The vector store
//! holds a derived copy; the typed record serializes into its payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::store::{Collection, StoredRecord};

// ============================================================================
// KINDS
// ============================================================================

/// Tag distinguishing record kinds in mixed result sets.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Decision,
    Thread,
    Priming,
    Pattern,
    Flag,
    Message,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Decision => "decision",
            RecordKind::Thread => "thread",
            RecordKind::Priming => "priming",
            RecordKind::Pattern => "pattern",
            RecordKind::Flag => "flag",
            RecordKind::Message => "message",
        }
    }

    /// The collection a kind lives in.
    pub fn collection(&self) -> Collection {
        match self {
            RecordKind::Decision => Collection::Decisions,
            RecordKind::Thread => Collection::Threads,
            RecordKind::Priming => Collection::Priming,
            RecordKind::Pattern => Collection::Patterns,
            RecordKind::Flag => Collection::Flags,
            RecordKind::Message => Collection::Messages,
        }
    }

    /// The kind stored in a collection, for mixed-set tagging.
    pub fn for_collection(collection: Collection) -> Option<Self> {
        match collection {
            Collection::Decisions => Some(RecordKind::Decision),
            Collection::Threads => Some(RecordKind::Thread),
            Collection::Priming => Some(RecordKind::Priming),
            Collection::Patterns => Some(RecordKind::Pattern),
            Collection::Flags => Some(RecordKind::Flag),
            Collection::Messages => Some(RecordKind::Message),
            Collection::Lineage | Collection::Scans => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Decision lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Active,
    Superseded,
    Resolved,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Active => "active",
            DecisionStatus::Superseded => "superseded",
            DecisionStatus::Resolved => "resolved",
        }
    }
}

/// Thread lifecycle. `Resolved` is terminal; a new thread revisits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Open,
    Resolved,
    Blocked,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Open => "open",
            ThreadStatus::Resolved => "resolved",
            ThreadStatus::Blocked => "blocked",
        }
    }
}

/// Thread priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Expedition flag category.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlagCategory {
    Inversion,
    Isomorphism,
    Fsd,
    Manifestation,
    Trap,
    #[default]
    General,
}

impl FlagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagCategory::Inversion => "inversion",
            FlagCategory::Isomorphism => "isomorphism",
            FlagCategory::Fsd => "fsd",
            FlagCategory::Manifestation => "manifestation",
            FlagCategory::Trap => "trap",
            FlagCategory::General => "general",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inversion" => Some(FlagCategory::Inversion),
            "isomorphism" => Some(FlagCategory::Isomorphism),
            "fsd" => Some(FlagCategory::Fsd),
            "manifestation" => Some(FlagCategory::Manifestation),
            "trap" => Some(FlagCategory::Trap),
            "general" => Some(FlagCategory::General),
            _ => None,
        }
    }
}

/// Expedition flag lifecycle: pending until compiled into priming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    #[default]
    Pending,
    Compiled,
    Discarded,
}

impl FlagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagStatus::Pending => "pending",
            FlagStatus::Compiled => "compiled",
            FlagStatus::Discarded => "discarded",
        }
    }
}

// ============================================================================
// DECISIONS
// ============================================================================

/// A decision extracted from a conversation, with conflict links and
/// hop-based staleness accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub id: String,
    pub project: String,
    /// Human-scoped identifier within the project, e.g. `D042`.
    pub local_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives_rejected: Vec<String>,
    /// Confidence in `[0, 1]`: >= 0.8 validated, 0.3..0.8 heuristic,
    /// < 0.3 speculative.
    pub epistemic_tier: f64,
    pub status: DecisionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    /// Compression hops since this decision was last validated.
    pub hops_since_validated: u32,
    pub last_validated_at_hop: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DecisionRecord {
    /// Staleness level for the current hop distance.
    pub fn staleness(&self) -> Staleness {
        Staleness::from_hops(self.hops_since_validated)
    }

    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: self.text.clone(),
            embedding,
            status: Some(self.status.as_str().to_string()),
            category: None,
            source_conversation: self.source_conversation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub(crate) fn from_stored(record: &StoredRecord) -> Result<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| MemoryError::Internal(format!("decision payload {}: {e}", record.id)))
    }
}

// ============================================================================
// THREADS
// ============================================================================

/// An open line of work carried across conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub id: String,
    pub project: String,
    /// Human-scoped identifier within the project, e.g. `T017`.
    pub local_id: String,
    pub title: String,
    pub description: String,
    pub status: ThreadStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Non-empty exactly when `status` is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub hops_since_validated: u32,
    pub last_validated_at_hop: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRecord {
    /// Surface text for embedding and recall.
    pub fn surface_text(title: &str, description: &str) -> String {
        if description.is_empty() {
            title.to_string()
        } else {
            format!("{title}: {description}")
        }
    }

    pub fn staleness(&self) -> Staleness {
        Staleness::from_hops(self.hops_since_validated)
    }

    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: Self::surface_text(&self.title, &self.description),
            embedding,
            status: Some(self.status.as_str().to_string()),
            category: None,
            source_conversation: self.source_conversation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub(crate) fn from_stored(record: &StoredRecord) -> Result<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| MemoryError::Internal(format!("thread payload {}: {e}", record.id)))
    }
}

// ============================================================================
// STALENESS
// ============================================================================

/// Hop-distance staleness band. Stale records still score normally; only
/// the freshness factor and the alerts surface change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Warning,
    Critical,
}

/// Hops after which a record is flagged for revalidation.
pub const STALE_WARNING_HOPS: u32 = 3;
/// Hops after which staleness is critical.
pub const STALE_CRITICAL_HOPS: u32 = 6;

impl Staleness {
    pub fn from_hops(hops: u32) -> Self {
        if hops >= STALE_CRITICAL_HOPS {
            Staleness::Critical
        } else if hops >= STALE_WARNING_HOPS {
            Staleness::Warning
        } else {
            Staleness::Fresh
        }
    }

    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

// ============================================================================
// PATTERNS
// ============================================================================

/// A recurring observation, merged on near-duplicate insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub id: String,
    pub project: String,
    pub text: String,
    pub confidence: f64,
    pub merge_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_merged_at: Option<DateTime<Utc>>,
    /// Earlier phrasings displaced by merges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatternRecord {
    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: self.text.clone(),
            embedding,
            status: None,
            category: None,
            source_conversation: self.source_conversation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub(crate) fn from_stored(record: &StoredRecord) -> Result<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| MemoryError::Internal(format!("pattern payload {}: {e}", record.id)))
    }
}

// ============================================================================
// PRIMING BLOCKS
// ============================================================================

/// A pre-compiled context payload indexed by topic keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimingBlock {
    pub id: String,
    pub project: String,
    pub territory_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub territory_keys: Vec<String>,
    pub confidence_floor: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_expeditions: Vec<String>,
    pub compiled_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrimingBlock {
    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: self.compiled_text.clone(),
            embedding,
            status: None,
            category: None,
            source_conversation: self.source_conversation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub(crate) fn from_stored(record: &StoredRecord) -> Result<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| MemoryError::Internal(format!("priming payload {}: {e}", record.id)))
    }
}

// ============================================================================
// EXPEDITION FLAGS
// ============================================================================

/// A bookmarked observation, pending until compiled into priming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpeditionFlag {
    pub id: String,
    pub project: String,
    pub category: FlagCategory,
    pub description: String,
    pub status: FlagStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpeditionFlag {
    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: self.description.clone(),
            embedding,
            status: Some(self.status.as_str().to_string()),
            category: Some(self.category.as_str().to_string()),
            source_conversation: self.source_conversation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }

    pub(crate) fn from_stored(record: &StoredRecord) -> Result<Self> {
        serde_json::from_value(record.payload.clone())
            .map_err(|e| MemoryError::Internal(format!("flag payload {}: {e}", record.id)))
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// A transcript chunk written by the ingestion pipeline. Header-only: it
/// participates in recall but has no registry semantics of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub project: String,
    pub text: String,
    pub source_conversation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    pub(crate) fn to_stored(&self, embedding: Vec<f32>) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.clone(),
            project: self.project.clone(),
            text: self.text.clone(),
            embedding,
            status: None,
            category: None,
            source_conversation: Some(self.source_conversation.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            payload: serde_json::to_value(self)?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
