//! Priming Blocks and Expedition Flags
//!
//! Auxiliary records around the core registries. Priming blocks are
//! pre-compiled context payloads indexed by territory keys; expedition
//! flags are bookmarked observations that stay `pending` until compiled
//! into priming or discarded.

use std::sync::Arc;

use chrono::Utc;

use crate::deadline::{self, Deadline};
use crate::embed::Embedder;
use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::record::{ExpeditionFlag, FlagCategory, FlagStatus, PrimingBlock};
use crate::retry::{self, RetryPolicy};
use crate::store::{Collection, SearchFilter, VectorStore};

/// Input for [`PrimingRegistry::compile`].
#[derive(Debug, Clone, Default)]
pub struct PrimingDraft {
    pub project: String,
    pub territory_name: String,
    pub territory_keys: Vec<String>,
    pub confidence_floor: f64,
    pub source_expeditions: Vec<String>,
    pub compiled_text: String,
}

/// Owner of the priming collection.
pub struct PrimingRegistry {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    retry: RetryPolicy,
}

impl PrimingRegistry {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, events: Arc<EventLog>) -> Self {
        Self { store, embedder, events, retry: RetryPolicy::default() }
    }

    /// Store a compiled priming block, keyed by territory name.
    pub async fn compile(&self, draft: PrimingDraft, deadline: Option<Deadline>) -> Result<PrimingBlock> {
        if draft.territory_name.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("territory name cannot be empty".to_string()));
        }
        if draft.compiled_text.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("compiled text cannot be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&draft.confidence_floor) {
            return Err(MemoryError::InvalidArgument(format!(
                "confidence floor must be in [0, 1], got {}",
                draft.confidence_floor
            )));
        }
        deadline::check(deadline)?;

        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let text = draft.compiled_text.clone();
            async move { embedder.embed(&text).await }
        })
        .await?;

        let now = Utc::now();
        let block = PrimingBlock {
            id: identity::record_id(Collection::Priming.as_str(), &draft.project, &draft.territory_name),
            project: draft.project,
            territory_name: draft.territory_name,
            territory_keys: draft.territory_keys,
            confidence_floor: draft.confidence_floor,
            source_expeditions: draft.source_expeditions,
            compiled_text: draft.compiled_text,
            source_conversation: None,
            created_at: now,
            updated_at: now,
        };
        deadline::check(deadline)?;
        self.store.upsert(Collection::Priming, block.to_stored(embedding)?).await?;
        self.events.append(EventKind::Write, "priming.compile", vec![block.id.clone()]);
        Ok(block)
    }

    pub async fn list(&self, project: Option<&str>) -> Result<Vec<PrimingBlock>> {
        let mut filter = SearchFilter::default();
        filter.project = project.map(str::to_string);
        let records = self.store.list(Collection::Priming, &filter, 0).await?;
        records.iter().map(PrimingBlock::from_stored).collect()
    }
}

/// Owner of the flags collection.
pub struct FlagRegistry {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    events: Arc<EventLog>,
    retry: RetryPolicy,
}

impl FlagRegistry {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, events: Arc<EventLog>) -> Self {
        Self { store, embedder, events, retry: RetryPolicy::default() }
    }

    /// Raise a flag. New flags are always `pending`.
    pub async fn raise(
        &self,
        project: &str,
        category: FlagCategory,
        description: &str,
        deadline: Option<Deadline>,
    ) -> Result<ExpeditionFlag> {
        if project.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("project cannot be empty".to_string()));
        }
        if description.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("flag description cannot be empty".to_string()));
        }
        deadline::check(deadline)?;

        let embedding = retry::with_backoff("embed", self.retry, deadline, || {
            let embedder = Arc::clone(&self.embedder);
            let text = description.to_string();
            async move { embedder.embed(&text).await }
        })
        .await?;

        let now = Utc::now();
        let flag = ExpeditionFlag {
            id: identity::record_id(
                Collection::Flags.as_str(),
                project,
                &format!("{}:{description}", category.as_str()),
            ),
            project: project.to_string(),
            category,
            description: description.to_string(),
            status: FlagStatus::Pending,
            source_conversation: None,
            created_at: now,
            updated_at: now,
        };
        deadline::check(deadline)?;
        self.store.upsert(Collection::Flags, flag.to_stored(embedding)?).await?;
        self.events.append(EventKind::Write, "flag.raise", vec![flag.id.clone()]);
        Ok(flag)
    }

    /// Move a flag out of `pending` once compiled into priming or discarded.
    pub async fn transition(&self, id: &str, status: FlagStatus) -> Result<ExpeditionFlag> {
        if status == FlagStatus::Pending {
            return Err(MemoryError::InvalidArgument(
                "flags cannot transition back to pending".to_string(),
            ));
        }
        let stored = self
            .store
            .get(Collection::Flags, id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("flag {id}")))?;
        let mut flag = ExpeditionFlag::from_stored(&stored)?;
        flag.status = status;
        flag.updated_at = Utc::now();
        self.store.upsert(Collection::Flags, flag.to_stored(stored.embedding)?).await?;
        self.events.append(EventKind::Write, "flag.transition", vec![flag.id.clone()]);
        Ok(flag)
    }

    pub async fn list(&self, project: Option<&str>, status: Option<FlagStatus>) -> Result<Vec<ExpeditionFlag>> {
        let mut filter = SearchFilter::default();
        filter.project = project.map(str::to_string);
        filter.status = status.map(|s| s.as_str().to_string());
        let records = self.store.list(Collection::Flags, &filter, 0).await?;
        records.iter().map(ExpeditionFlag::from_stored).collect()
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let filter = SearchFilter::default().with_status(FlagStatus::Pending.as_str());
        self.store.count(Collection::Flags, &filter).await
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

    fn fixtures() -> (PrimingRegistry, FlagRegistry) {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new());
        let events = Arc::new(EventLog::new());
        (
            PrimingRegistry::new(Arc::clone(&store), Arc::clone(&embedder), Arc::clone(&events)),
            FlagRegistry::new(store, embedder, events),
        )
    }

    #[tokio::test]
    async fn compile_and_list_priming() {
        let (priming, _) = fixtures();
        let block = priming
            .compile(
                PrimingDraft {
                    project: "atlas".into(),
                    territory_name: "auth".into(),
                    territory_keys: vec!["oauth".into(), "tokens".into()],
                    confidence_floor: 0.6,
                    source_expeditions: vec!["f1".into()],
                    compiled_text: "OAuth2 with refresh tokens is the settled approach".into(),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(block.territory_name, "auth");

        let listed = priming.list(Some("atlas")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(priming.list(Some("hermes")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flags_start_pending_and_transition_once() {
        let (_, flags) = fixtures();
        let flag = flags
            .raise("atlas", FlagCategory::Trap, "retry loop hides real failures", None)
            .await
            .unwrap();
        assert_eq!(flag.status, FlagStatus::Pending);
        assert_eq!(flags.pending_count().await.unwrap(), 1);

        let compiled = flags.transition(&flag.id, FlagStatus::Compiled).await.unwrap();
        assert_eq!(compiled.status, FlagStatus::Compiled);
        assert_eq!(flags.pending_count().await.unwrap(), 0);

        let err = flags.transition(&flag.id, FlagStatus::Pending).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn flag_listing_filters_by_category_status() {
        let (_, flags) = fixtures();
        flags.raise("atlas", FlagCategory::Inversion, "invert the cache dependency", None).await.unwrap();
        flags.raise("hermes", FlagCategory::General, "note the retry budget", None).await.unwrap();

        let atlas = flags.list(Some("atlas"), Some(FlagStatus::Pending)).await.unwrap();
        assert_eq!(atlas.len(), 1);
        assert_eq!(atlas[0].category, FlagCategory::Inversion);
    }
}
