//! Attention recall microbenchmark: scoring + packing over a populated
//! in-memory store.

use std::sync::Arc;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use braid_core::{
    AttentionEngine, AttentionWeights, Collection, HashedEmbedder, MemoryVectorStore,
    RecallRequest, StoredRecord, VectorStore,
};

fn populated_store(rt: &tokio::runtime::Runtime, per_collection: usize) -> Arc<MemoryVectorStore> {
    let store = Arc::new(MemoryVectorStore::new());
    let embedder = HashedEmbedder::new();
    let now = Utc::now();

    rt.block_on(async {
        for collection in [Collection::Decisions, Collection::Threads, Collection::Messages] {
            for i in 0..per_collection {
                let text = format!(
                    "{} item {i}: decisions about caching, auth flows, and event ordering",
                    collection.as_str()
                );
                let embedding = braid_core::Embedder::embed(&embedder, &text).await.unwrap();
                store
                    .upsert(
                        collection,
                        StoredRecord {
                            id: format!("{}-{i:05}", collection.as_str()),
                            project: format!("project-{}", i % 7),
                            text,
                            embedding,
                            status: Some("active".to_string()),
                            category: None,
                            source_conversation: Some(format!("c{}", i % 11)),
                            created_at: now,
                            updated_at: now,
                            payload: json!({"epistemicTier": (i % 10) as f64 / 10.0, "conflictsWith": []}),
                        },
                    )
                    .await
                    .unwrap();
            }
        }
    });
    store
}

fn bench_recall(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = populated_store(&rt, 500);
    let engine = AttentionEngine::new(
        store,
        Arc::new(HashedEmbedder::new()),
        AttentionWeights::default(),
    );

    c.bench_function("recall_1500_candidates", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .recall(RecallRequest {
                        query: "how do we cache auth tokens".to_string(),
                        budget_tokens: Some(2000),
                        ..RecallRequest::default()
                    })
                    .await
                    .unwrap()
            })
        })
    });
}

criterion_group!(benches, bench_recall);
criterion_main!(benches);
