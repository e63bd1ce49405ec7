//! Session and Remember Tools
//!
//! The TTL scratchpad: `remember` writes a value, `session` snapshots the
//! live entries of one session namespace.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn session_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "sessionId": {
                "type": "string",
                "description": "Session namespace; keys are <sessionId>/<name>"
            }
        },
        "required": ["sessionId"]
    })
}

pub fn remember_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "key": {
                "type": "string",
                "description": "Scratchpad key, conventionally <sessionId>/<name>"
            },
            "value": {
                "description": "Any JSON value"
            },
            "ttl": {
                "type": "integer",
                "description": "Seconds until expiry",
                "minimum": 1
            }
        },
        "required": ["key", "value", "ttl"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionArgs {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RememberArgs {
    key: String,
    value: Value,
    ttl: i64,
}

pub async fn execute_session(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: SessionArgs = parse_args(args)?;
    let entries = service.session(&args.session_id)?;
    Ok(serde_json::json!({
        "sessionId": args.session_id,
        "total": entries.len(),
        "entries": entries,
    }))
}

pub async fn execute_remember(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: RememberArgs = parse_args(args)?;
    let entry = service.remember(&args.key, args.value, args.ttl)?;
    Ok(serde_json::json!({
        "key": entry.key,
        "expiresAt": entry.expires_at.to_rfc3339(),
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
    async fn remember_then_snapshot() {
        let service = test_service();
        execute_remember(
            &service,
            Some(serde_json::json!({ "key": "s1/cursor", "value": {"offset": 3}, "ttl": 60 })),
        )
        .await
        .unwrap();

        let result = execute_session(&service, Some(serde_json::json!({ "sessionId": "s1" })))
            .await
            .unwrap();
        assert_eq!(result["total"], 1);
        assert_eq!(result["entries"][0]["value"]["offset"], 3);
    }

    #[tokio::test]
    async fn nonpositive_ttl_is_invalid() {
        let service = test_service();
        let err = execute_remember(
            &service,
            Some(serde_json::json!({ "key": "s1/x", "value": 1, "ttl": 0 })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
