//! Stats and Projects Tools
//!
//! Collection counts and the project roster.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde_json::Value;

pub fn stats_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub fn projects_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute_stats(service: &Arc<MemoryService>, _args: Option<Value>) -> Result<Value> {
    let stats = service.stats().await?;
    let collections: serde_json::Map<String, Value> = stats
        .collections
        .iter()
        .map(|(name, count)| (name.clone(), Value::from(*count)))
        .collect();
    Ok(serde_json::json!({
        "collections": collections,
        "events": stats.events,
        "embeddingModel": stats.embedding_model,
        "lineageEdges": stats.lineage_edges,
    }))
}

pub async fn execute_projects(service: &Arc<MemoryService>, _args: Option<Value>) -> Result<Value> {
    let projects = service.projects().await?;
    let rows: Vec<Value> = projects
        .iter()
        .map(|(project, count)| serde_json::json!({ "project": project, "records": count }))
        .collect();
    Ok(serde_json::json!({ "total": rows.len(), "projects": rows }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;
    use braid_core::DecisionDraft;

    #[tokio::test]
    async fn stats_count_collections() {
        let service = test_service();
        service
            .decide(
                DecisionDraft {
                    project: "atlas".into(),
                    local_id: "D001".into(),
                    text: "Keep the ledger append-only".into(),
                    ..DecisionDraft::default()
                },
                None,
            )
            .await
            .unwrap();

        let result = execute_stats(&service, None).await.unwrap();
        assert_eq!(result["collections"]["decisions"], 1);
        assert_eq!(result["collections"]["threads"], 0);

        let projects = execute_projects(&service, None).await.unwrap();
        assert_eq!(projects["total"], 1);
        assert_eq!(projects["projects"][0]["project"], "atlas");
    }
}
