//! Thread Registry
//!
//! Open lines of work, carried across conversations. State machine:
//! `open -> blocked -> open -> resolved`, with `resolved` terminal — a new
//! thread is opened to revisit. Hop staleness mirrors the decision
//! registry, and a compression edge can resolve threads outright.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::debug;

use crate::deadline::{self, Deadline};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::lineage::LineageEdge;
use crate::record::{Priority, ThreadRecord, ThreadStatus};
use crate::retry::{self, RetryPolicy};
use crate::store::{Collection, SearchFilter, VectorStore};

/// Input for [`ThreadRegistry::open`].
#[derive(Debug, Clone, Default)]
pub struct ThreadDraft {
    pub project: String,
    pub local_id: String,
    pub title: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub source_conversation: Option<String>,
}

/// Owner of the threads collection.
pub struct ThreadRegistry {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    retry: RetryPolicy,
    local_ids: Mutex<HashMap<(String, String), String>>,
}

impl ThreadRegistry {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, events: Arc<EventLog>) -> Self {
        Self {
            store,
            embedder,
            events,
            retry: RetryPolicy::default(),
            local_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Open a thread. Replaying an identical open is idempotent.
    pub async fn open(&self, draft: ThreadDraft, deadline: Option<Deadline>) -> Result<ThreadRecord> {
        if draft.project.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("project cannot be empty".to_string()));
        }
        if draft.local_id.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("local id cannot be empty".to_string()));
        }
        if draft.title.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("thread title cannot be empty".to_string()));
        }
        deadline::check(deadline)?;

        let id = identity::record_id(Collection::Threads.as_str(), &draft.project, &draft.local_id);

        if let Some(existing) = self.store.get(Collection::Threads, &id).await? {
            let existing = ThreadRecord::from_stored(&existing)?;
            if existing.title == draft.title && existing.description == draft.description {
                debug!(%id, "thread open replayed");
                return Ok(existing);
            }
            return Err(MemoryError::Conflict(format!(
                "local id {} already opened in project {}",
                draft.local_id, draft.project
            )));
        }

        let surface = ThreadRecord::surface_text(&draft.title, &draft.description);
        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let surface = surface.clone();
            async move { embedder.embed(&surface).await }
        })
        .await?;

        let now = Utc::now();
        let thread = ThreadRecord {
            id: id.clone(),
            project: draft.project.clone(),
            local_id: draft.local_id.clone(),
            title: draft.title,
            description: draft.description,
            status: ThreadStatus::Open,
            priority: draft.priority.unwrap_or_default(),
            blocked_by: Vec::new(),
            resolution: None,
            hops_since_validated: 0,
            last_validated_at_hop: 0,
            source_conversation: draft.source_conversation,
            created_at: now,
            updated_at: now,
        };

        deadline::check(deadline)?;
        self.store.upsert(Collection::Threads, thread.to_stored(embedding)?).await?;

        if let Ok(mut index) = self.local_ids.lock() {
            index.insert((thread.project.clone(), thread.local_id.clone()), id.clone());
        }
        self.events.append(EventKind::Write, "thread.open", vec![id]);
        Ok(thread)
    }

    /// Resolve a thread. The resolution text is mandatory and `resolved`
    /// is terminal.
    pub async fn resolve(&self, id: &str, resolution: &str) -> Result<ThreadRecord> {
        if resolution.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "resolution text cannot be empty".to_string(),
            ));
        }
        let mut thread = self.load(id).await?;
        if thread.status == ThreadStatus::Resolved {
            return Err(MemoryError::Conflict(format!(
                "thread {} is already resolved; open a new thread to revisit",
                thread.local_id
            )));
        }
        thread.status = ThreadStatus::Resolved;
        thread.resolution = Some(resolution.to_string());
        thread.blocked_by.clear();
        thread.updated_at = Utc::now();
        self.save(&thread).await?;
        self.events.append(EventKind::Write, "thread.resolve", vec![thread.id.clone()]);
        Ok(thread)
    }

    /// Block a thread on the given blockers; an empty list reopens it.
    pub async fn block(&self, id: &str, blockers: Vec<String>) -> Result<ThreadRecord> {
        let mut thread = self.load(id).await?;
        if thread.status == ThreadStatus::Resolved {
            return Err(MemoryError::Conflict(format!(
                "thread {} is resolved and cannot change state",
                thread.local_id
            )));
        }
        thread.status = if blockers.is_empty() { ThreadStatus::Open } else { ThreadStatus::Blocked };
        thread.blocked_by = blockers;
        thread.updated_at = Utc::now();
        self.save(&thread).await?;
        self.events.append(EventKind::Write, "thread.block", vec![thread.id.clone()]);
        Ok(thread)
    }

    /// Reset the hop counter after an explicit revalidation.
    pub async fn validate_thread(&self, id: &str, current_hop: u64) -> Result<ThreadRecord> {
        let mut thread = self.load(id).await?;
        thread.hops_since_validated = 0;
        thread.last_validated_at_hop = current_hop;
        thread.updated_at = Utc::now();
        self.save(&thread).await?;
        self.events.append(EventKind::Write, "thread.validate", vec![thread.id.clone()]);
        Ok(thread)
    }

    /// Apply a compression edge: unresolved threads living in the
    /// compressed conversation chain gain a hop unless carried with a
    /// revalidation marker; threads the edge resolves are closed with a
    /// synthetic resolution.
    ///
    /// `conversations` is the edge's source plus its ancestor chain.
    pub async fn bump_hops_on_compression(
        &self,
        edge: &LineageEdge,
        conversations: &[String],
        current_hop: u64,
    ) -> Result<usize> {
        let mut records = Vec::new();
        for conversation in conversations {
            let filter = SearchFilter::default()
                .with_source_conversation(conversation.clone());
            records.extend(self.store.list(Collection::Threads, &filter, 0).await?);
        }

        let mut touched = Vec::new();
        for stored in &records {
            let mut thread = ThreadRecord::from_stored(stored)?;
            if thread.status == ThreadStatus::Resolved {
                continue;
            }
            if edge.threads_resolved.iter().any(|t| t == &thread.id) {
                thread.status = ThreadStatus::Resolved;
                thread.resolution = Some(format!(
                    "Resolved during compression into {}",
                    edge.target_conversation
                ));
                thread.blocked_by.clear();
            } else {
                match edge.carried_thread(&thread.id) {
                    Some(true) => {
                        thread.hops_since_validated = 0;
                        thread.last_validated_at_hop = current_hop;
                    }
                    _ => thread.hops_since_validated += 1,
                }
            }
            thread.updated_at = Utc::now();
            self.store
                .upsert(Collection::Threads, thread.to_stored(stored.embedding.clone())?)
                .await?;
            touched.push(thread.id);
        }

        if !touched.is_empty() {
            self.events.append(EventKind::Write, "thread.bump_hops", touched.clone());
        }
        Ok(touched.len())
    }

    pub async fn get(&self, id: &str) -> Result<ThreadRecord> {
        self.load(id).await
    }

    pub async fn get_by_local(&self, project: &str, local_id: &str) -> Result<ThreadRecord> {
        let id = identity::record_id(Collection::Threads.as_str(), project, local_id);
        self.load(&id).await
    }

    pub async fn list_project(&self, project: &str) -> Result<Vec<ThreadRecord>> {
        let records = self
            .store
            .list(Collection::Threads, &SearchFilter::for_project(project.to_string()), 0)
            .await?;
        records.iter().map(ThreadRecord::from_stored).collect()
    }

    /// Unresolved threads at or past the warning staleness band.
    pub async fn stale(&self, project: Option<&str>) -> Result<Vec<ThreadRecord>> {
        let mut filter = SearchFilter::default();
        filter.project = project.map(str::to_string);
        let records = self.store.list(Collection::Threads, &filter, 0).await?;
        let mut stale = Vec::new();
        for stored in &records {
            let thread = ThreadRecord::from_stored(stored)?;
            if thread.status != ThreadStatus::Resolved && thread.staleness().is_stale() {
                stale.push(thread);
            }
        }
        Ok(stale)
    }

    async fn load(&self, id: &str) -> Result<ThreadRecord> {
        let stored = self
            .store
            .get(Collection::Threads, id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("thread {id}")))?;
        ThreadRecord::from_stored(&stored)
    }

    async fn save(&self, thread: &ThreadRecord) -> Result<()> {
        let stored = self
            .store
            .get(Collection::Threads, &thread.id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("thread {}", thread.id)))?;
        self.store
            .upsert(Collection::Threads, thread.to_stored(stored.embedding)?)
            .await
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

    fn registry() -> ThreadRegistry {
        ThreadRegistry::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashedEmbedder::new()),
            Arc::new(EventLog::new()),
        )
    }

    fn draft(local_id: &str, title: &str) -> ThreadDraft {
        ThreadDraft {
            project: "atlas".to_string(),
            local_id: local_id.to_string(),
            title: title.to_string(),
            description: "details".to_string(),
            priority: Some(Priority::High),
            source_conversation: Some("c1".to_string()),
        }
    }

    #[tokio::test]
    async fn open_then_resolve() {
        let registry = registry();
        let thread = registry.open(draft("T001", "Migrate auth"), None).await.unwrap();
        assert_eq!(thread.status, ThreadStatus::Open);
        assert!(thread.resolution.is_none());

        let resolved = registry.resolve(&thread.id, "Shipped OAuth2 flow").await.unwrap();
        assert_eq!(resolved.status, ThreadStatus::Resolved);
        assert_eq!(resolved.resolution.as_deref(), Some("Shipped OAuth2 flow"));
    }

    #[tokio::test]
    async fn resolve_requires_text_and_is_terminal() {
        let registry = registry();
        let thread = registry.open(draft("T001", "Migrate auth"), None).await.unwrap();

        let err = registry.resolve(&thread.id, "  ").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        registry.resolve(&thread.id, "done").await.unwrap();
        let err = registry.resolve(&thread.id, "done again").await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        let err = registry.block(&thread.id, vec!["T002".into()]).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn block_and_reopen_cycle() {
        let registry = registry();
        let thread = registry.open(draft("T001", "Migrate auth"), None).await.unwrap();

        let blocked = registry.block(&thread.id, vec!["T002".into()]).await.unwrap();
        assert_eq!(blocked.status, ThreadStatus::Blocked);
        assert_eq!(blocked.blocked_by, vec!["T002".to_string()]);

        let reopened = registry.block(&thread.id, vec![]).await.unwrap();
        assert_eq!(reopened.status, ThreadStatus::Open);
        assert!(reopened.blocked_by.is_empty());

        let resolved = registry.resolve(&thread.id, "unblocked and shipped").await.unwrap();
        assert_eq!(resolved.status, ThreadStatus::Resolved);
    }

    #[tokio::test]
    async fn duplicate_open_with_different_title_conflicts() {
        let registry = registry();
        registry.open(draft("T001", "Migrate auth"), None).await.unwrap();
        let replay = registry.open(draft("T001", "Migrate auth"), None).await.unwrap();
        assert_eq!(replay.local_id, "T001");
        let err = registry.open(draft("T001", "Different title"), None).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn missing_thread_is_not_found() {
        let registry = registry();
        assert_eq!(registry.get("nope").await.unwrap_err().kind(), "not_found");
    }
}
