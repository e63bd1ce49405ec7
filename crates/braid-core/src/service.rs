//! Memory Service Facade
//!
//! Wires the embedder, the store, the registries, the lineage graph, the
//! scanner, the scratchpad, and the attention engine into the capability
//! surface the transports expose: fourteen operations plus the
//! collaborator entry points (compression edges, message ingestion).

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attention::{AttentionEngine, RecallRequest, RecallResponse};
use crate::config::Config;
use crate::deadline::Deadline;
use crate::embed::Embedder;
use crate::entangle::{EntanglementScanner, ScanSnapshot};
use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::lineage::{EdgeDraft, LineageEdge, LineageGraph, LineageTrace};
use crate::pattern::{PatternOutcome, PatternStore};
use crate::priming::{FlagRegistry, PrimingDraft, PrimingRegistry};
use crate::record::{
    DecisionRecord, ExpeditionFlag, FlagCategory, FlagStatus, MessageRecord, PrimingBlock,
    RecordKind, ThreadRecord,
};
use crate::registry::{DecisionDraft, DecisionRegistry, RegisteredDecision, ThreadDraft, ThreadRegistry};
use crate::retry::{self, RetryPolicy};
use crate::scratchpad::{Scratchpad, ScratchpadEntry};
use crate::store::{Collection, SearchFilter, VectorStore};

// ============================================================================
// READ PAYLOADS
// ============================================================================

/// Everything a session needs to resume work on a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project: String,
    pub decisions: Vec<DecisionRecord>,
    pub threads: Vec<ThreadRecord>,
    pub flags: Vec<ExpeditionFlag>,
    pub stale_decisions: Vec<DecisionRecord>,
    pub stale_threads: Vec<ThreadRecord>,
    pub conflicts: Vec<DecisionRecord>,
}

/// Counts that warrant a look.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerts {
    pub stale_decisions: usize,
    pub stale_threads: usize,
    pub conflicts: usize,
    pub pending_flags: usize,
    pub resonances: usize,
    pub loose_ends: usize,
}

/// Per-collection record counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub collections: Vec<(String, usize)>,
    pub events: usize,
    pub embedding_model: String,
    pub lineage_edges: usize,
}

/// One hit of a single-collection search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedHit {
    pub id: String,
    pub score: f32,
    pub project: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RecordKind>,
}

// ============================================================================
// SERVICE
// ============================================================================

/// The engine behind every transport.
pub struct MemoryService {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    decisions: DecisionRegistry,
    threads: ThreadRegistry,
    patterns: PatternStore,
    priming: PrimingRegistry,
    flags: FlagRegistry,
    lineage: LineageGraph,
    scratchpad: Scratchpad,
    scanner: EntanglementScanner,
    attention: AttentionEngine,
    retry: RetryPolicy,
}

impl MemoryService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, config: Config) -> Result<Self> {
        config.attention_weights.validate()?;
        let events = Arc::new(EventLog::new());
        Ok(Self {
            decisions: DecisionRegistry::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            threads: ThreadRegistry::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            patterns: PatternStore::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            priming: PrimingRegistry::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            flags: FlagRegistry::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            scanner: EntanglementScanner::new(Arc::clone(&store), Arc::clone(&events)),
            attention: AttentionEngine::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                config.attention_weights,
            ),
            lineage: LineageGraph::new(),
            scratchpad: Scratchpad::new(),
            events,
            store,
            embedder,
            config,
            retry: RetryPolicy::default(),
        })
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    pub fn lineage(&self) -> &LineageGraph {
        &self.lineage
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Attention-weighted cross-collection recall.
    pub async fn recall(&self, request: RecallRequest) -> Result<RecallResponse> {
        let response = self.attention.recall(request).await?;
        self.events.append(
            EventKind::Read,
            "recall",
            response.items.iter().map(|i| i.id.clone()).collect(),
        );
        Ok(response)
    }

    /// Full working context for one project.
    pub async fn project_context(&self, project: &str) -> Result<ProjectContext> {
        if project.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("project cannot be empty".to_string()));
        }
        let decisions = self.decisions.list_project(project).await?;
        let threads = self.threads.list_project(project).await?;
        let flags = self.flags.list(Some(project), None).await?;
        let stale_decisions = self.decisions.stale(Some(project)).await?;
        let stale_threads = self.threads.stale(Some(project)).await?;
        let conflicts = self.decisions.conflicted(Some(project)).await?;
        self.events.append(EventKind::Read, "project_context", vec![project.to_string()]);
        Ok(ProjectContext {
            project: project.to_string(),
            decisions,
            threads,
            flags,
            stale_decisions,
            stale_threads,
            conflicts,
        })
    }

    /// Latest entanglement snapshot, filtered. Runs a scan when none has
    /// completed yet.
    pub async fn entanglement(
        &self,
        min_similarity: Option<f32>,
        min_cluster_size: Option<usize>,
    ) -> Result<ScanSnapshot> {
        let mut snapshot = match self.scanner.latest().await? {
            Some(snapshot) => snapshot,
            None => self.scanner.scan().await?,
        };
        if let Some(floor) = min_similarity {
            snapshot.resonances.retain(|r| r.similarity >= floor);
            snapshot.bridges.retain(|b| b.similarity >= floor);
            snapshot.resonance_count = snapshot.resonances.len();
        }
        if let Some(size) = min_cluster_size {
            snapshot.clusters.retain(|c| c.member_ids.len() >= size);
        }
        self.events.append(EventKind::Read, "entanglement", vec![snapshot.id.clone()]);
        Ok(snapshot)
    }

    /// Lineage in both directions from a conversation.
    pub async fn trace(&self, conversation: &str, limit: Option<usize>) -> Result<LineageTrace> {
        if !self.lineage.knows(conversation)? {
            return Err(MemoryError::NotFound(format!("conversation {conversation}")));
        }
        let trace = self.lineage.trace(conversation, limit.unwrap_or(0))?;
        self.events.append(EventKind::Read, "trace", vec![conversation.to_string()]);
        Ok(trace)
    }

    /// Staleness, conflict, and entanglement counters.
    pub async fn alerts(&self) -> Result<Alerts> {
        let stale_decisions = self.decisions.stale(None).await?.len();
        let stale_threads = self.threads.stale(None).await?.len();
        let conflicts = self.decisions.conflicted(None).await?.len();
        let pending_flags = self.flags.pending_count().await?;
        let (resonances, loose_ends) = match self.scanner.latest().await? {
            Some(snapshot) => (snapshot.resonance_count, snapshot.loose_ends.len()),
            None => (0, 0),
        };
        self.events.append(EventKind::Read, "alerts", vec![]);
        Ok(Alerts {
            stale_decisions,
            stale_threads,
            conflicts,
            pending_flags,
            resonances,
            loose_ends,
        })
    }

    /// Ranked results from a single collection.
    pub async fn search(
        &self,
        scope: Collection,
        query: &str,
        k: Option<usize>,
        deadline: Option<Deadline>,
    ) -> Result<Vec<ScopedHit>> {
        if query.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("query cannot be empty".to_string()));
        }
        let k = k.unwrap_or(10).clamp(1, 100);
        let embedding = retry::with_backoff("embed_query", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let query = query.to_string();
            async move { embedder.embed(&query).await }
        })
        .await?;
        let hits = self
            .store
            .search(scope, &embedding, k, &SearchFilter::empty())
            .await?;
        self.events.append(
            EventKind::Read,
            "search",
            hits.iter().map(|h| h.id.clone()).collect(),
        );
        Ok(hits
            .into_iter()
            .map(|hit| ScopedHit {
                id: hit.id,
                score: hit.score,
                project: hit.record.project,
                text: hit.record.text,
                kind: RecordKind::for_collection(scope),
            })
            .collect())
    }

    /// Per-collection counts.
    pub async fn stats(&self) -> Result<Stats> {
        let mut collections = Vec::new();
        for collection in [
            Collection::Decisions,
            Collection::Threads,
            Collection::Patterns,
            Collection::Priming,
            Collection::Flags,
            Collection::Messages,
            Collection::Scans,
        ] {
            let count = self.store.count(collection, &SearchFilter::empty()).await?;
            collections.push((collection.as_str().to_string(), count));
        }
        Ok(Stats {
            collections,
            events: self.events.len(),
            embedding_model: self.embedder.model().to_string(),
            lineage_edges: self.lineage.edge_count(),
        })
    }

    /// Known projects with record counts.
    pub async fn projects(&self) -> Result<Vec<(String, usize)>> {
        self.store.projects().await
    }

    /// Scratchpad snapshot for a session. Keys are namespaced
    /// `<session_id>/<name>`.
    pub fn session(&self, session_id: &str) -> Result<Vec<ScratchpadEntry>> {
        if session_id.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("session id cannot be empty".to_string()));
        }
        let prefix = format!("{session_id}/");
        let now = Utc::now();
        let mut entries = self.scratchpad.snapshot(&prefix, now);
        if let Some(exact) = self.scratchpad.get(session_id, now) {
            entries.insert(0, exact);
        }
        Ok(entries)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Register a decision, with two-signal conflict detection.
    pub async fn decide(&self, draft: DecisionDraft, deadline: Option<Deadline>) -> Result<RegisteredDecision> {
        if let Some(conversation) = &draft.source_conversation {
            self.lineage.register_conversation(conversation, Some(&draft.project))?;
        }
        self.decisions.register(draft, deadline).await
    }

    /// Mark one decision superseded by another.
    pub async fn supersede(&self, old_id: &str, new_id: &str) -> Result<(DecisionRecord, DecisionRecord)> {
        self.decisions.supersede(old_id, new_id, self.lineage.hop_clock()).await
    }

    /// Reset a decision's staleness after revalidation.
    pub async fn validate_decision(&self, id: &str) -> Result<DecisionRecord> {
        self.decisions.validate_decision(id, self.lineage.hop_clock()).await
    }

    /// Open a thread.
    pub async fn thread_open(&self, draft: ThreadDraft, deadline: Option<Deadline>) -> Result<ThreadRecord> {
        if let Some(conversation) = &draft.source_conversation {
            self.lineage.register_conversation(conversation, Some(&draft.project))?;
        }
        self.threads.open(draft, deadline).await
    }

    /// Resolve a thread by record id or `(project, local_id)`.
    pub async fn thread_resolve(&self, project: &str, reference: &str, resolution: &str) -> Result<ThreadRecord> {
        let id = self.thread_ref(project, reference).await?;
        self.threads.resolve(&id, resolution).await
    }

    /// Block (or, with no blockers, reopen) a thread.
    pub async fn thread_block(&self, project: &str, reference: &str, blockers: Vec<String>) -> Result<ThreadRecord> {
        let id = self.thread_ref(project, reference).await?;
        self.threads.block(&id, blockers).await
    }

    /// Raise an expedition flag.
    pub async fn flag(
        &self,
        project: &str,
        category: FlagCategory,
        description: &str,
        deadline: Option<Deadline>,
    ) -> Result<ExpeditionFlag> {
        self.flags.raise(project, category, description, deadline).await
    }

    /// Move a flag out of pending.
    pub async fn flag_transition(&self, id: &str, status: FlagStatus) -> Result<ExpeditionFlag> {
        self.flags.transition(id, status).await
    }

    /// Register a pattern, merging near-duplicates.
    pub async fn pattern(
        &self,
        project: &str,
        text: &str,
        confidence: Option<f64>,
        deadline: Option<Deadline>,
    ) -> Result<PatternOutcome> {
        self.patterns.register(project, text, confidence, deadline).await
    }

    /// Compile a priming block.
    pub async fn prime(&self, draft: PrimingDraft, deadline: Option<Deadline>) -> Result<PrimingBlock> {
        self.priming.compile(draft, deadline).await
    }

    /// Store a session value with a TTL.
    pub fn remember(&self, key: &str, value: serde_json::Value, ttl_seconds: i64) -> Result<ScratchpadEntry> {
        let entry = self.scratchpad.put(key, value, ttl_seconds, Utc::now())?;
        self.events.append(EventKind::Write, "remember", vec![key.to_string()]);
        Ok(entry)
    }

    // ========================================================================
    // COLLABORATOR ENTRY POINTS
    // ========================================================================

    /// Record a compression event and bump hop counters in both
    /// registries. Called by the archive ingestion pipeline.
    pub async fn compress(&self, draft: EdgeDraft) -> Result<LineageEdge> {
        let edge = self.lineage.add_edge(draft)?;
        let clock = self.lineage.hop_clock();

        // The compression folds forward everything the source conversation
        // inherited, so the whole ancestor chain ages by one hop.
        let mut conversations = vec![edge.source_conversation.clone()];
        for ancestor in self.lineage.ancestors(&edge.source_conversation, 0)? {
            if !conversations.contains(&ancestor.source_conversation) {
                conversations.push(ancestor.source_conversation.clone());
            }
        }

        let bumped_decisions = self
            .decisions
            .bump_hops_on_compression(&edge, &conversations, clock)
            .await?;
        let bumped_threads = self
            .threads
            .bump_hops_on_compression(&edge, &conversations, clock)
            .await?;
        info!(
            edge = %edge.id,
            bumped_decisions, bumped_threads, "compression edge applied"
        );
        self.events.append(EventKind::Write, "lineage.add_edge", vec![edge.id.clone()]);
        Ok(edge)
    }

    /// Store a transcript chunk from the ingestion pipeline.
    pub async fn ingest_message(
        &self,
        project: &str,
        conversation: &str,
        text: &str,
        deadline: Option<Deadline>,
    ) -> Result<MessageRecord> {
        if text.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("message text cannot be empty".to_string()));
        }
        self.lineage.register_conversation(conversation, Some(project))?;
        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let text = text.to_string();
            async move { embedder.embed(&text).await }
        })
        .await?;
        let now = Utc::now();
        let message = MessageRecord {
            id: identity::record_id(Collection::Messages.as_str(), project, &format!("{conversation}:{text}")),
            project: project.to_string(),
            text: text.to_string(),
            source_conversation: conversation.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.upsert(Collection::Messages, message.to_stored(embedding)?).await?;
        self.events.append(EventKind::Write, "message.ingest", vec![message.id.clone()]);
        Ok(message)
    }

    /// Run the background entanglement scan once.
    pub async fn scan(&self) -> Result<ScanSnapshot> {
        self.scanner.scan().await
    }

    /// Sweep expired scratchpad entries.
    pub fn sweep_scratchpad(&self) -> usize {
        self.scratchpad.sweep(Utc::now())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn thread_ref(&self, project: &str, reference: &str) -> Result<String> {
        // Accept either the record id or the project-scoped local id.
        if self.store.get(Collection::Threads, reference).await?.is_some() {
            return Ok(reference.to_string());
        }
        let id = identity::record_id(Collection::Threads.as_str(), project, reference);
        if self.store.get(Collection::Threads, &id).await?.is_some() {
            return Ok(id);
        }
        Err(MemoryError::NotFound(format!("thread {reference} in project {project}")))
    }

    /// Resolve a decision reference the same way.
    pub async fn decision_ref(&self, project: &str, reference: &str) -> Result<String> {
        if self.store.get(Collection::Decisions, reference).await?.is_some() {
            return Ok(reference.to_string());
        }
        let id = identity::record_id(Collection::Decisions.as_str(), project, reference);
        if self.store.get(Collection::Decisions, &id).await?.is_some() {
            return Ok(id);
        }
        Err(MemoryError::NotFound(format!("decision {reference} in project {project}")))
    }
}

// ============================================================================
// TESTS
// ============================================================================
