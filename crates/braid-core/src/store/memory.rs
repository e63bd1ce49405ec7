//! In-Memory Vector Store
//!
//! `BTreeMap`-backed store with exact brute-force cosine search. Used by
//! tests and ephemeral runs; the sqlite store is the durable twin.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embed::cosine_similarity;
use crate::error::{MemoryError, Result};

use super::{sort_hits, sort_records, Collection, SearchFilter, SearchHit, StoredRecord, VectorStore};

/// Process-local store. Cheap to clone records out of; all reads see the
/// latest completed write (read-your-writes per collection).
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, StoredRecord>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(e: std::sync::PoisonError<T>) -> MemoryError {
        MemoryError::Internal(format!("store lock poisoned: {e}"))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: Collection, record: StoredRecord) -> Result<()> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        collections
            .entry(collection)
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn search(
        &self,
        collection: Collection,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        let Some(records) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|r| !r.embedding.is_empty() && filter.matches(r))
            .map(|r| SearchHit {
                id: r.id.clone(),
                score: cosine_similarity(query, &r.embedding),
                record: r.clone(),
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRecord>> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        Ok(collections.get(&collection).and_then(|c| c.get(id)).cloned())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().map_err(Self::lock_err)?;
        Ok(collections
            .get_mut(&collection)
            .is_some_and(|c| c.remove(id).is_some()))
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<StoredRecord>> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        let mut records: Vec<StoredRecord> = collections
            .get(&collection)
            .map(|c| c.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        sort_records(&mut records);
        if limit > 0 {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn count(&self, collection: Collection, filter: &SearchFilter) -> Result<usize> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        Ok(collections
            .get(&collection)
            .map(|c| c.values().filter(|r| filter.matches(r)).count())
            .unwrap_or(0))
    }

    async fn projects(&self) -> Result<Vec<(String, usize)>> {
        let collections = self.collections.read().map_err(Self::lock_err)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for records in collections.values() {
            for record in records.values() {
                if !record.project.is_empty() {
                    *counts.entry(record.project.clone()).or_default() += 1;
                }
            }
        }
        Ok(counts.into_iter().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(id: &str, project: &str, embedding: Vec<f32>) -> StoredRecord {
        let now = Utc::now();
        StoredRecord {
            id: id.to_string(),
            project: project.to_string(),
            text: format!("record {id}"),
            embedding,
            status: Some("active".to_string()),
            category: None,
            source_conversation: None,
            created_at: now,
            updated_at: now,
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_id() {
        let store = MemoryVectorStore::new();
        store.upsert(Collection::Decisions, record("a", "p1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(Collection::Decisions, record("a", "p1", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(store.count(Collection::Decisions, &SearchFilter::empty()).await.unwrap(), 1);
        let got = store.get(Collection::Decisions, "a").await.unwrap().unwrap();
        assert_eq!(got.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn search_sorts_by_score_then_id() {
        let store = MemoryVectorStore::new();
        store.upsert(Collection::Decisions, record("b", "p1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(Collection::Decisions, record("a", "p1", vec![1.0, 0.0])).await.unwrap();
        store.upsert(Collection::Decisions, record("c", "p1", vec![0.0, 1.0])).await.unwrap();

        let hits = store
            .search(Collection::Decisions, &[1.0, 0.0], 10, &SearchFilter::empty())
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits[0].score > hits[2].score);
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let store = MemoryVectorStore::new();
        let mut r = record("a", "p1", vec![1.0, 0.0]);
        r.status = Some("active".to_string());
        store.upsert(Collection::Decisions, r).await.unwrap();
        let mut r = record("b", "p1", vec![1.0, 0.0]);
        r.status = Some("superseded".to_string());
        store.upsert(Collection::Decisions, r).await.unwrap();
        let mut r = record("c", "p2", vec![1.0, 0.0]);
        r.status = Some("active".to_string());
        store.upsert(Collection::Decisions, r).await.unwrap();

        let filter = SearchFilter::for_project("p1").with_status("active");
        let hits = store.search(Collection::Decisions, &[1.0, 0.0], 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn delete_and_projects() {
        let store = MemoryVectorStore::new();
        store.upsert(Collection::Decisions, record("a", "p1", vec![1.0])).await.unwrap();
        store.upsert(Collection::Threads, record("b", "p2", vec![1.0])).await.unwrap();
        store.upsert(Collection::Threads, record("c", "p2", vec![1.0])).await.unwrap();

        assert!(store.delete(Collection::Decisions, "a").await.unwrap());
        assert!(!store.delete(Collection::Decisions, "a").await.unwrap());

        let projects = store.projects().await.unwrap();
        assert_eq!(projects, vec![("p2".to_string(), 2)]);
    }

    #[tokio::test]
    async fn records_without_embeddings_are_invisible_to_search() {
        let store = MemoryVectorStore::new();
        store.upsert(Collection::Scans, record("snap", "", Vec::new())).await.unwrap();
        let hits = store.search(Collection::Scans, &[1.0], 10, &SearchFilter::empty()).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.count(Collection::Scans, &SearchFilter::empty()).await.unwrap(), 1);
    }
}
