//! Recall Tool
//!
//! Attention-weighted cross-collection recall, packed to a token budget.

use std::sync::Arc;

use braid_core::{MemoryService, RecallRequest, Result, SearchFilter};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to reconstruct context for"
            },
            "budget": {
                "type": "integer",
                "description": "Token budget for the packed result (default: 2000)",
                "minimum": 1
            },
            "filters": {
                "type": "object",
                "description": "Conjunctive metadata filter applied to every collection",
                "properties": {
                    "project": { "type": "string" },
                    "status": { "type": "string" },
                    "category": { "type": "string" },
                    "sourceConversation": { "type": "string" }
                }
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecallArgs {
    query: String,
    budget: Option<usize>,
    filters: Option<SearchFilter>,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: RecallArgs = parse_args(args)?;
    let response = service
        .recall(RecallRequest {
            query: args.query,
            budget_tokens: args.budget,
            filters: args.filters,
            deadline: deadline_from_ms(args.deadline_ms),
        })
        .await?;
    Ok(serde_json::to_value(response)?)
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
    async fn recall_returns_ranked_items_with_factors() {
        let service = test_service();
        service
            .decide(
                DecisionDraft {
                    project: "atlas".into(),
                    local_id: "D001".into(),
                    text: "Cache auth tokens in Redis with a short TTL".into(),
                    epistemic_tier: Some(0.8),
                    ..DecisionDraft::default()
                },
                None,
            )
            .await
            .unwrap();

        let args = serde_json::json!({ "query": "auth token caching", "budget": 500 });
        let result = execute(&service, Some(args)).await.unwrap();
        let items = result["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0]["factors"]["similarity"].is_number());
        assert_eq!(result["budgetTokens"], 500);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let service = test_service();
        let err = execute(&service, Some(serde_json::json!({ "query": "  " }))).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn missing_arguments_are_invalid() {
        let service = test_service();
        let err = execute(&service, None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
