//! Decision Registry
//!
//! Registration embeds the decision, finds nearest active neighbors in and
//! across the project, and runs the two-signal conflict detector on each
//! close neighbor. Only confirmed contradictions land in `conflicts_with`,
//! and always symmetrically.
//!
//! Staleness is counted in compression hops, never wall-clock: every
//! lineage edge bumps the active decisions of its source conversation
//! unless the edge carries them with a revalidation marker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use crate::conflict::ConflictDetector;
use crate::deadline::{self, Deadline};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::lineage::LineageEdge;
use crate::record::{DecisionRecord, DecisionStatus};
use crate::retry::{self, RetryPolicy};
use crate::store::{Collection, SearchFilter, VectorStore};

/// Neighbors fetched per conflict probe.
const CONFLICT_PROBE_K: usize = 8;

/// Input for [`DecisionRegistry::register`].
#[derive(Debug, Clone, Default)]
pub struct DecisionDraft {
    pub project: String,
    pub local_id: String,
    pub text: String,
    pub rationale: Option<String>,
    pub alternatives_rejected: Vec<String>,
    /// Defaults to 0.5 (heuristic band) when unset.
    pub epistemic_tier: Option<f64>,
    pub source_conversation: Option<String>,
}

/// A confirmed contradiction found during registration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub id: String,
    pub local_id: String,
    pub project: String,
    pub text: String,
    pub similarity: f32,
    pub subject_overlap: f64,
}

/// Result of a registration: the stored decision plus what it contradicts.
#[derive(Debug, Clone)]
pub struct RegisteredDecision {
    pub decision: DecisionRecord,
    pub conflicts: Vec<ConflictReport>,
    /// True when the call replayed an identical registration.
    pub replayed: bool,
}

/// Owner of the decisions collection.
pub struct DecisionRegistry {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    detector: ConflictDetector,
    retry: RetryPolicy,
    /// (project, local_id) -> record id, for fast duplicate checks.
    local_ids: Mutex<HashMap<(String, String), String>>,
}

impl DecisionRegistry {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, events: Arc<EventLog>) -> Self {
        Self {
            store,
            embedder,
            events,
            detector: ConflictDetector::default(),
            retry: RetryPolicy::default(),
            local_ids: Mutex::new(HashMap::new()),
        }
    }

    fn validate(draft: &DecisionDraft) -> Result<f64> {
        if draft.project.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("project cannot be empty".to_string()));
        }
        if draft.local_id.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("local id cannot be empty".to_string()));
        }
        if draft.text.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("decision text cannot be empty".to_string()));
        }
        let tier = draft.epistemic_tier.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&tier) {
            return Err(MemoryError::InvalidArgument(format!(
                "epistemic tier must be in [0, 1], got {tier}"
            )));
        }
        Ok(tier)
    }

    /// Register a decision, detecting conflicts against its neighbors.
    pub async fn register(
        &self,
        draft: DecisionDraft,
        deadline: Option<Deadline>,
    ) -> Result<RegisteredDecision> {
        let tier = Self::validate(&draft)?;
        deadline::check(deadline)?;

        let id = identity::record_id(
            Collection::Decisions.as_str(),
            &draft.project,
            &draft.local_id,
        );

        // Duplicate local id in the same project is a conflict; replaying
        // the identical registration is idempotent.
        if let Some(existing) = self.store.get(Collection::Decisions, &id).await? {
            let existing = DecisionRecord::from_stored(&existing)?;
            if existing.text == draft.text {
                debug!(%id, "decision registration replayed");
                return Ok(RegisteredDecision { decision: existing, conflicts: vec![], replayed: true });
            }
            return Err(MemoryError::Conflict(format!(
                "local id {} already registered in project {}",
                draft.local_id, draft.project
            )));
        }

        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let text = draft.text.clone();
            async move { embedder.embed(&text).await }
        })
        .await?;

        // Probe in-project first, then across projects, and judge every
        // close active neighbor.
        deadline::check(deadline)?;
        let in_project = SearchFilter::for_project(draft.project.clone())
            .with_status(DecisionStatus::Active.as_str());
        let everywhere = SearchFilter::default().with_status(DecisionStatus::Active.as_str());
        let mut neighbors = self
            .store
            .search(Collection::Decisions, &embedding, CONFLICT_PROBE_K, &in_project)
            .await?;
        for hit in self
            .store
            .search(Collection::Decisions, &embedding, CONFLICT_PROBE_K, &everywhere)
            .await?
        {
            if !neighbors.iter().any(|n| n.id == hit.id) {
                neighbors.push(hit);
            }
        }

        let mut conflicts = Vec::new();
        for hit in &neighbors {
            if hit.id == id || hit.score < self.detector.similarity_floor {
                continue;
            }
            let verdict = self.detector.judge(&draft.text, &hit.record.text, hit.score);
            if verdict.is_conflict() {
                let neighbor = DecisionRecord::from_stored(&hit.record)?;
                conflicts.push(ConflictReport {
                    id: neighbor.id.clone(),
                    local_id: neighbor.local_id.clone(),
                    project: neighbor.project.clone(),
                    text: neighbor.text.clone(),
                    similarity: hit.score,
                    subject_overlap: verdict.subject_overlap,
                });
            }
        }

        let now = Utc::now();
        let decision = DecisionRecord {
            id: id.clone(),
            project: draft.project.clone(),
            local_id: draft.local_id.clone(),
            text: draft.text.clone(),
            rationale: draft.rationale,
            alternatives_rejected: draft.alternatives_rejected,
            epistemic_tier: tier,
            status: DecisionStatus::Active,
            conflicts_with: conflicts.iter().map(|c| c.id.clone()).collect(),
            hops_since_validated: 0,
            last_validated_at_hop: 0,
            source_conversation: draft.source_conversation,
            created_at: now,
            updated_at: now,
        };

        deadline::check(deadline)?;
        self.store
            .upsert(Collection::Decisions, decision.to_stored(embedding)?)
            .await?;

        // Conflict symmetry: the neighbor learns about us too.
        for report in &conflicts {
            self.link_conflict(&report.id, &id).await?;
        }

        if let Ok(mut index) = self.local_ids.lock() {
            index.insert((decision.project.clone(), decision.local_id.clone()), id.clone());
        }

        let mut event_ids = vec![id.clone()];
        event_ids.extend(conflicts.iter().map(|c| c.id.clone()));
        self.events.append(EventKind::Write, "decision.register", event_ids);

        if !conflicts.is_empty() {
            info!(%id, count = conflicts.len(), "decision registered with conflicts");
        }

        Ok(RegisteredDecision { decision, conflicts, replayed: false })
    }

    /// Mark `old_id` superseded by `new_id`, cross-linking the conflict and
    /// resetting the successor's hop counter.
    pub async fn supersede(&self, old_id: &str, new_id: &str, current_hop: u64) -> Result<(DecisionRecord, DecisionRecord)> {
        if old_id == new_id {
            return Err(MemoryError::InvalidArgument(
                "a decision cannot supersede itself".to_string(),
            ));
        }
        let mut old = self.load(old_id).await?;
        let mut new = self.load(new_id).await?;

        old.status = DecisionStatus::Superseded;
        if !old.conflicts_with.contains(&new.id) {
            old.conflicts_with.push(new.id.clone());
        }
        if !new.conflicts_with.contains(&old.id) {
            new.conflicts_with.push(old.id.clone());
        }
        new.hops_since_validated = 0;
        new.last_validated_at_hop = current_hop;
        let now = Utc::now();
        old.updated_at = now;
        new.updated_at = now;

        self.save(&old).await?;
        self.save(&new).await?;
        self.events.append(
            EventKind::Write,
            "decision.supersede",
            vec![old.id.clone(), new.id.clone()],
        );
        Ok((old, new))
    }

    /// Reset the hop counter after an explicit revalidation.
    pub async fn validate_decision(&self, id: &str, current_hop: u64) -> Result<DecisionRecord> {
        let mut decision = self.load(id).await?;
        decision.hops_since_validated = 0;
        decision.last_validated_at_hop = current_hop;
        decision.updated_at = Utc::now();
        self.save(&decision).await?;
        self.events.append(EventKind::Write, "decision.validate", vec![decision.id.clone()]);
        Ok(decision)
    }

    /// Update the epistemic tier. A rationale is required: tier moves are
    /// meaningful only with a reason attached.
    pub async fn retier(&self, id: &str, tier: f64, rationale: &str) -> Result<DecisionRecord> {
        if !(0.0..=1.0).contains(&tier) {
            return Err(MemoryError::InvalidArgument(format!(
                "epistemic tier must be in [0, 1], got {tier}"
            )));
        }
        if rationale.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "tier updates require a rationale".to_string(),
            ));
        }
        let mut decision = self.load(id).await?;
        decision.epistemic_tier = tier;
        decision.rationale = Some(rationale.to_string());
        decision.updated_at = Utc::now();
        self.save(&decision).await?;
        self.events.append(EventKind::Write, "decision.retier", vec![decision.id.clone()]);
        Ok(decision)
    }

    /// Apply a compression edge: every active decision living in the
    /// compressed conversation chain gains a hop unless the edge carries
    /// it with a revalidation marker, which resets the counter instead.
    ///
    /// `conversations` is the edge's source plus its ancestor chain — the
    /// conversations whose context the compression folds forward.
    pub async fn bump_hops_on_compression(
        &self,
        edge: &LineageEdge,
        conversations: &[String],
        current_hop: u64,
    ) -> Result<usize> {
        let mut records = Vec::new();
        for conversation in conversations {
            let filter = SearchFilter::default()
                .with_status(DecisionStatus::Active.as_str())
                .with_source_conversation(conversation.clone());
            records.extend(self.store.list(Collection::Decisions, &filter, 0).await?);
        }

        let mut touched = Vec::new();
        for stored in &records {
            let mut decision = DecisionRecord::from_stored(stored)?;
            match edge.carried_decision(&decision.id) {
                Some(true) => {
                    decision.hops_since_validated = 0;
                    decision.last_validated_at_hop = current_hop;
                }
                _ => decision.hops_since_validated += 1,
            }
            decision.updated_at = Utc::now();
            self.store
                .upsert(Collection::Decisions, decision.to_stored(stored.embedding.clone())?)
                .await?;
            touched.push(decision.id);
        }

        if !touched.is_empty() {
            self.events.append(EventKind::Write, "decision.bump_hops", touched.clone());
        }
        Ok(touched.len())
    }

    pub async fn get(&self, id: &str) -> Result<DecisionRecord> {
        self.load(id).await
    }

    pub async fn get_by_local(&self, project: &str, local_id: &str) -> Result<DecisionRecord> {
        let id = identity::record_id(Collection::Decisions.as_str(), project, local_id);
        self.load(&id).await
    }

    /// All decisions for a project, newest first.
    pub async fn list_project(&self, project: &str) -> Result<Vec<DecisionRecord>> {
        let records = self
            .store
            .list(Collection::Decisions, &SearchFilter::for_project(project), 0)
            .await?;
        records.iter().map(DecisionRecord::from_stored).collect()
    }

    /// Active decisions at or past the warning staleness band.
    pub async fn stale(&self, project: Option<&str>) -> Result<Vec<DecisionRecord>> {
        let mut filter = SearchFilter::default().with_status(DecisionStatus::Active.as_str());
        filter.project = project.map(str::to_string);
        let records = self.store.list(Collection::Decisions, &filter, 0).await?;
        let mut stale = Vec::new();
        for stored in &records {
            let decision = DecisionRecord::from_stored(stored)?;
            if decision.staleness().is_stale() {
                stale.push(decision);
            }
        }
        Ok(stale)
    }

    /// Decisions carrying at least one conflict link.
    pub async fn conflicted(&self, project: Option<&str>) -> Result<Vec<DecisionRecord>> {
        let mut filter = SearchFilter::default();
        filter.project = project.map(str::to_string);
        let records = self.store.list(Collection::Decisions, &filter, 0).await?;
        let mut out = Vec::new();
        for stored in &records {
            let decision = DecisionRecord::from_stored(stored)?;
            if !decision.conflicts_with.is_empty() {
                out.push(decision);
            }
        }
        Ok(out)
    }

    async fn load(&self, id: &str) -> Result<DecisionRecord> {
        let stored = self
            .store
            .get(Collection::Decisions, id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("decision {id}")))?;
        DecisionRecord::from_stored(&stored)
    }

    async fn save(&self, decision: &DecisionRecord) -> Result<()> {
        let stored = self
            .store
            .get(Collection::Decisions, &decision.id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("decision {}", decision.id)))?;
        self.store
            .upsert(Collection::Decisions, decision.to_stored(stored.embedding)?)
            .await
    }

    async fn link_conflict(&self, id: &str, other: &str) -> Result<()> {
        let mut decision = self.load(id).await?;
        if !decision.conflicts_with.contains(&other.to_string()) {
            decision.conflicts_with.push(other.to_string());
            decision.updated_at = Utc::now();
            self.save(&decision).await?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
