//! End-to-end scenarios over the full service: conflict detection,
//! paraphrase handling, attention ordering, budget packing, hop staleness,
//! and entanglement clustering.
//!
//! A stub embedder pins the cosine geometry per scenario so thresholds are
//! exercised exactly; unmapped texts fall back to the deterministic hashed
//! embedder.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use braid_core::{
    AttentionEngine, AttentionWeights, Collection, Config, DecisionDraft, DecisionStatus,
    EdgeDraft, Embedder, HashedEmbedder, MemoryService, MemoryVectorStore, RecallRequest,
    Result as MemoryResult, SearchFilter, Staleness, StoredRecord, VectorStore,
};

// ============================================================================
// FIXTURES
// ============================================================================

/// Embedder with prescribed vectors for known texts.
struct StubEmbedder {
    map: HashMap<String, Vec<f32>>,
    fallback: HashedEmbedder,
}

impl StubEmbedder {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            map: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            fallback: HashedEmbedder::new(),
        }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        match self.map.get(text) {
            Some(vector) => Ok(vector.clone()),
            None => self.fallback.embed(text).await,
        }
    }

    fn model(&self) -> &str {
        "stub"
    }
}

fn service_with(embedder: Arc<dyn Embedder>) -> (MemoryService, Arc<MemoryVectorStore>) {
    let store = Arc::new(MemoryVectorStore::new());
    let service = MemoryService::new(store.clone(), embedder, Config::default()).unwrap();
    (service, store)
}

fn decision_draft(project: &str, local_id: &str, text: &str, tier: f64) -> DecisionDraft {
    DecisionDraft {
        project: project.to_string(),
        local_id: local_id.to_string(),
        text: text.to_string(),
        epistemic_tier: Some(tier),
        source_conversation: Some("c1".to_string()),
        ..DecisionDraft::default()
    }
}

fn message(id: &str, text: &str, embedding: Vec<f32>, updated_at: DateTime<Utc>) -> StoredRecord {
    StoredRecord {
        id: id.to_string(),
        project: "atlas".to_string(),
        text: text.to_string(),
        embedding,
        status: None,
        category: None,
        source_conversation: Some("c1".to_string()),
        created_at: updated_at,
        updated_at,
        payload: json!({}),
    }
}

// ============================================================================
// SCENARIO 1 + 2: CONFLICTS AND PARAPHRASES
// ============================================================================

#[tokio::test]
async fn contradicting_decisions_conflict_symmetrically() {
    let d1_text = "Use JWT tokens only";
    let d2_text = "JWT-only rejected; use OAuth2 with refresh tokens";
    // cosine(d1, d2) = 0.8, above the 0.72 proximity floor.
    let embedder = Arc::new(StubEmbedder::new(&[
        (d1_text, vec![1.0, 0.0]),
        (d2_text, vec![0.8, 0.6]),
    ]));
    let (service, _) = service_with(embedder);

    let d1 = service
        .decide(decision_draft("atlas", "D001", d1_text, 0.8), None)
        .await
        .unwrap()
        .decision;
    let d2 = service
        .decide(decision_draft("atlas", "D002", d2_text, 0.85), None)
        .await
        .unwrap();

    assert_eq!(d2.conflicts.len(), 1);
    assert_eq!(d2.conflicts[0].id, d1.id);
    assert_eq!(d2.decision.conflicts_with, vec![d1.id.clone()]);

    // Symmetry: the earlier decision learned about the later one.
    let context = service.project_context("atlas").await.unwrap();
    let d1_after = context.decisions.iter().find(|d| d.id == d1.id).unwrap();
    assert!(d1_after.conflicts_with.contains(&d2.decision.id));

    // Both stay active until an explicit supersede.
    assert_eq!(d1_after.status, DecisionStatus::Active);
    assert_eq!(d2.decision.status, DecisionStatus::Active);

    let (old, new) = service.supersede(&d1.id, &d2.decision.id).await.unwrap();
    assert_eq!(old.status, DecisionStatus::Superseded);
    assert_eq!(new.status, DecisionStatus::Active);
    assert_eq!(new.hops_since_validated, 0);
}

#[tokio::test]
async fn paraphrased_decisions_do_not_conflict() {
    let d1_text = "Use UUID v7 for resource IDs";
    let d2_text = "Resource identifiers should be UUID v7";
    // High similarity, no negation asymmetry.
    let embedder = Arc::new(StubEmbedder::new(&[
        (d1_text, vec![1.0, 0.0]),
        (d2_text, vec![0.93, 0.367_56]),
    ]));
    let (service, _) = service_with(embedder);

    service
        .decide(decision_draft("atlas", "D001", d1_text, 0.8), None)
        .await
        .unwrap();
    let d2 = service
        .decide(decision_draft("atlas", "D002", d2_text, 0.8), None)
        .await
        .unwrap();

    assert!(d2.conflicts.is_empty());
    assert!(d2.decision.conflicts_with.is_empty());
    let context = service.project_context("atlas").await.unwrap();
    assert!(context.conflicts.is_empty());
}

// ============================================================================
// SCENARIO 3: ATTENTION ORDERING
// ============================================================================

#[tokio::test]
async fn trusted_fresh_decision_outranks_similar_stale_message() {
    let now = Utc::now();
    let query = "token auth approach";
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(&[(query, vec![1.0, 0.0])]));
    let store = Arc::new(MemoryVectorStore::new());

    // A: decision, tier 0.9, age 1 day, cosine 0.80.
    let mut a = message("decision-a", "Use OAuth2 with refresh tokens", vec![0.8, 0.6], now - Duration::days(1));
    a.status = Some("active".to_string());
    a.payload = json!({"epistemicTier": 0.9, "conflictsWith": []});
    store.upsert(Collection::Decisions, a).await.unwrap();

    // B: message, no tier, age 90 days, cosine 0.95.
    let b = message("message-b", "long discussion about token auth", vec![0.95, 0.312_25], now - Duration::days(90));
    store.upsert(Collection::Messages, b).await.unwrap();

    let engine = AttentionEngine::new(store, embedder, AttentionWeights::default());
    let response = engine
        .recall_at(
            RecallRequest { query: query.to_string(), ..RecallRequest::default() },
            now,
        )
        .await
        .unwrap();

    assert_eq!(response.items.len(), 2);
    let first = &response.items[0];
    let second = &response.items[1];
    assert_eq!(first.id, "decision-a");
    assert_eq!(second.id, "message-b");

    // The decomposed factors land near the worked example.
    assert!((first.attention - 0.83).abs() < 0.02, "attention(A) = {}", first.attention);
    assert!((second.attention - 0.49).abs() < 0.02, "attention(B) = {}", second.attention);
    assert!((first.factors.similarity - 0.90).abs() < 0.01);
    assert!((first.factors.epistemic_tier - 0.90).abs() < f64::EPSILON);
    assert!((second.factors.category_boost - 0.30).abs() < f64::EPSILON);
}

// ============================================================================
// SCENARIO 4: BUDGET PACKING
// ============================================================================

#[tokio::test]
async fn packing_respects_budget_and_skips_oversized_items() {
    let now = Utc::now();
    let query = "query";
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(&[(query, vec![1.0, 0.0])]));
    let store = Arc::new(MemoryVectorStore::new());

    // Descending similarity; text lengths cost [40, 80, 30, 20, 10] tokens
    // under the 4-chars-per-token heuristic.
    let rows: [(&str, f32, usize); 5] = [
        ("m-a", 0.99, 160),
        ("m-b", 0.95, 320),
        ("m-c", 0.90, 120),
        ("m-d", 0.85, 80),
        ("m-e", 0.80, 40),
    ];
    for (id, cos, chars) in rows {
        let y = (1.0 - cos * cos).sqrt();
        store
            .upsert(Collection::Messages, message(id, &"x".repeat(chars), vec![cos, y], now))
            .await
            .unwrap();
    }

    let engine = AttentionEngine::new(store, embedder, AttentionWeights::default());
    let response = engine
        .recall_at(
            RecallRequest {
                query: query.to_string(),
                budget_tokens: Some(100),
                ..RecallRequest::default()
            },
            now,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = response.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["m-a", "m-c", "m-d", "m-e"]);
    assert_eq!(response.tokens_used, 100);
    assert!(response.tokens_used <= response.budget_tokens);
}

// ============================================================================
// SCENARIO 5: HOP STALENESS
// ============================================================================

#[tokio::test]
async fn uncarried_decision_goes_stale_after_three_hops() {
    let (service, _) = service_with(Arc::new(HashedEmbedder::new()));

    let d = service
        .decide(decision_draft("atlas", "D001", "Pin the schema version in every event", 0.8), None)
        .await
        .unwrap()
        .decision;

    for (source, target) in [("c1", "c2"), ("c2", "c3"), ("c3", "c4")] {
        service
            .compress(EdgeDraft {
                source_conversation: source.to_string(),
                target_conversation: target.to_string(),
                ..EdgeDraft::default()
            })
            .await
            .unwrap();
    }

    let context = service.project_context("atlas").await.unwrap();
    let decision = context.decisions.iter().find(|x| x.id == d.id).unwrap();
    assert_eq!(decision.hops_since_validated, 3);
    assert_eq!(decision.staleness(), Staleness::Warning);

    let alerts = service.alerts().await.unwrap();
    assert_eq!(alerts.stale_decisions, 1);

    // A revalidation resets the counter.
    let validated = service.validate_decision(&d.id).await.unwrap();
    assert_eq!(validated.hops_since_validated, 0);
    assert_eq!(service.alerts().await.unwrap().stale_decisions, 0);
}

#[tokio::test]
async fn carried_with_marker_resets_instead_of_aging() {
    let (service, _) = service_with(Arc::new(HashedEmbedder::new()));
    let d = service
        .decide(decision_draft("atlas", "D001", "Pin the schema version", 0.8), None)
        .await
        .unwrap()
        .decision;

    service
        .compress(EdgeDraft {
            source_conversation: "c1".into(),
            target_conversation: "c2".into(),
            ..EdgeDraft::default()
        })
        .await
        .unwrap();
    service
        .compress(EdgeDraft {
            source_conversation: "c2".into(),
            target_conversation: "c3".into(),
            decisions_carried: vec![format!("{}!", d.id)],
            ..EdgeDraft::default()
        })
        .await
        .unwrap();

    let context = service.project_context("atlas").await.unwrap();
    let decision = context.decisions.iter().find(|x| x.id == d.id).unwrap();
    assert_eq!(decision.hops_since_validated, 0);
    assert_eq!(decision.last_validated_at_hop, 2);
}

// ============================================================================
// SCENARIO 6: ENTANGLEMENT CLUSTER
// ============================================================================

#[tokio::test]
async fn cross_project_decisions_form_one_cluster_with_bridges() {
    let texts: [(&str, &str, &str); 5] = [
        ("p1", "E001", "Kafka backbone moves ingest events"),
        ("p1", "E002", "Stream compaction keeps tail latency flat"),
        ("p2", "E003", "Event ordering rides the partition key"),
        ("p3", "E004", "Consumer lag alarms page the rota"),
        ("p2", "E005", "Replay rebuilds caches from the log"),
    ];
    // All five share one region of the space; the sixth is orthogonal.
    let mut entries: Vec<(&str, Vec<f32>)> = texts
        .iter()
        .enumerate()
        .map(|(i, (_, _, text))| {
            let theta = 0.05 * i as f32;
            (*text, vec![theta.cos(), theta.sin(), 0.0])
        })
        .collect();
    entries.push(("Watercolor supplies for the offsite", vec![0.0, 0.0, 1.0]));
    let embedder = Arc::new(StubEmbedder::new(&entries));
    let (service, _) = service_with(embedder);

    let mut ids = Vec::new();
    for (project, local_id, text) in texts {
        let d = service
            .decide(decision_draft(project, local_id, text, 0.7), None)
            .await
            .unwrap()
            .decision;
        ids.push(d.id);
    }
    let lonely = service
        .decide(decision_draft("p1", "E006", "Watercolor supplies for the offsite", 0.5), None)
        .await
        .unwrap()
        .decision;

    let snapshot = service.scan().await.unwrap();

    assert_eq!(snapshot.clusters.len(), 1);
    let cluster = &snapshot.clusters[0];
    assert_eq!(cluster.member_ids.len(), 5);
    assert_eq!(cluster.projects, vec!["p1", "p2", "p3"]);
    assert!(snapshot.bridges.len() >= 3);
    for id in &ids {
        assert!(!snapshot.loose_ends.contains(id));
    }
    assert!(snapshot.loose_ends.contains(&lonely.id));

    // The read surface serves the same snapshot.
    let latest = service.entanglement(None, Some(2)).await.unwrap();
    assert_eq!(latest.clusters.len(), 1);
}

// ============================================================================
// CROSS-CUTTING PROPERTIES
// ============================================================================

#[tokio::test]
async fn recall_is_deterministic_for_a_fixed_corpus() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new());
    let store = Arc::new(MemoryVectorStore::new());
    let service = MemoryService::new(store.clone(), embedder.clone(), Config::default()).unwrap();

    for (i, text) in [
        "Use OAuth2 with refresh tokens",
        "Cache sessions in Redis",
        "Ship the audit log first",
        "Postgres is the system of record",
    ]
    .iter()
    .enumerate()
    {
        service
            .decide(decision_draft("atlas", &format!("D{i:03}"), text, 0.6), None)
            .await
            .unwrap();
        service.ingest_message("atlas", "c1", &format!("note {i}: {text}"), None).await.unwrap();
    }

    let engine = AttentionEngine::new(store, embedder, AttentionWeights::default());
    let now = Utc::now();
    let request = RecallRequest { query: "auth and caching".to_string(), ..RecallRequest::default() };

    let first = engine.recall_at(request.clone(), now).await.unwrap();
    let second = engine.recall_at(request, now).await.unwrap();
    let ids = |r: &braid_core::RecallResponse| r.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert!(!first.items.is_empty());
}

#[tokio::test]
async fn younger_of_two_identical_records_scores_at_least_as_high() {
    let now = Utc::now();
    let query = "query";
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(&[(query, vec![1.0, 0.0])]));
    let store = Arc::new(MemoryVectorStore::new());

    store
        .upsert(Collection::Messages, message("young", "same text", vec![0.9, 0.435_89], now - Duration::days(2)))
        .await
        .unwrap();
    store
        .upsert(Collection::Messages, message("old", "same text", vec![0.9, 0.435_89], now - Duration::days(60)))
        .await
        .unwrap();

    let engine = AttentionEngine::new(store, embedder, AttentionWeights::default());
    let response = engine
        .recall_at(RecallRequest { query: query.to_string(), ..RecallRequest::default() }, now)
        .await
        .unwrap();

    let young = response.items.iter().find(|i| i.id == "young").unwrap();
    let old = response.items.iter().find(|i| i.id == "old").unwrap();
    assert!(young.attention >= old.attention);
    assert_eq!(response.items[0].id, "young");
}

#[tokio::test]
async fn replayed_registration_leaves_one_row_and_one_event() {
    let (service, store) = service_with(Arc::new(HashedEmbedder::new()));
    service
        .decide(decision_draft("atlas", "D001", "Use OAuth2", 0.8), None)
        .await
        .unwrap();
    let events_after_first = service.events().len();
    service
        .decide(decision_draft("atlas", "D001", "Use OAuth2", 0.8), None)
        .await
        .unwrap();

    let count = store.count(Collection::Decisions, &SearchFilter::empty()).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(service.events().len(), events_after_first);
}
