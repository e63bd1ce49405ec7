//! Project Context Tool
//!
//! Everything a session needs to resume a project: decisions, threads,
//! flags, staleness, and conflicts.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "project": {
                "type": "string",
                "description": "Project to load context for"
            }
        },
        "required": ["project"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextArgs {
    project: String,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: ContextArgs = parse_args(args)?;
    let context = service.project_context(&args.project).await?;
    Ok(serde_json::to_value(context)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;
    use braid_core::{DecisionDraft, ThreadDraft};

    #[tokio::test]
    async fn context_includes_all_project_surfaces() {
        let service = test_service();
        service
            .decide(
                DecisionDraft {
                    project: "atlas".into(),
                    local_id: "D001".into(),
                    text: "Postgres is the system of record".into(),
                    ..DecisionDraft::default()
                },
                None,
            )
            .await
            .unwrap();
        service
            .thread_open(
                ThreadDraft {
                    project: "atlas".into(),
                    local_id: "T001".into(),
                    title: "Wire up replication".into(),
                    description: String::new(),
                    priority: None,
                    source_conversation: None,
                },
                None,
            )
            .await
            .unwrap();

        let result = execute(&service, Some(serde_json::json!({ "project": "atlas" }))).await.unwrap();
        assert_eq!(result["decisions"].as_array().unwrap().len(), 1);
        assert_eq!(result["threads"].as_array().unwrap().len(), 1);
        assert_eq!(result["staleDecisions"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn empty_project_is_invalid() {
        let service = test_service();
        let err = execute(&service, Some(serde_json::json!({ "project": " " }))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
