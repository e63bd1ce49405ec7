//! Search Tool
//!
//! Ranked results from a single collection.

use std::sync::Arc;

use braid_core::{Collection, MemoryError, MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "scope": {
                "type": "string",
                "description": "Collection to search",
                "enum": ["decisions", "threads", "patterns", "priming", "flags", "messages"]
            },
            "query": {
                "type": "string",
                "description": "Search query"
            },
            "k": {
                "type": "integer",
                "description": "Maximum results (default: 10)",
                "minimum": 1,
                "maximum": 100
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["scope", "query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    scope: String,
    query: String,
    k: Option<usize>,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: SearchArgs = parse_args(args)?;
    let scope = Collection::parse_name(&args.scope)
        .ok_or_else(|| MemoryError::InvalidArgument(format!("unknown scope {}", args.scope)))?;
    let hits = service
        .search(scope, &args.query, args.k, deadline_from_ms(args.deadline_ms))
        .await?;
    Ok(serde_json::json!({
        "scope": args.scope,
        "total": hits.len(),
        "results": hits,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;

    #[tokio::test]
    async fn search_is_scoped() {
        let service = test_service();
        service.ingest_message("atlas", "c1", "cache warming notes", None).await.unwrap();

        let result = execute(
            &service,
            Some(serde_json::json!({ "scope": "messages", "query": "cache warming" })),
        )
        .await
        .unwrap();
        assert_eq!(result["total"], 1);

        let result = execute(
            &service,
            Some(serde_json::json!({ "scope": "decisions", "query": "cache warming" })),
        )
        .await
        .unwrap();
        assert_eq!(result["total"], 0);
    }

    #[tokio::test]
    async fn unknown_scope_is_invalid() {
        let service = test_service();
        let err = execute(&service, Some(serde_json::json!({ "scope": "nope", "query": "x" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
