//! Trace Tool
//!
//! Lineage of a conversation in both directions.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "conversationId": {
                "type": "string",
                "description": "Conversation to trace"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum edges per direction (default: unlimited)",
                "minimum": 1
            }
        },
        "required": ["conversationId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceArgs {
    conversation_id: String,
    limit: Option<usize>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: TraceArgs = parse_args(args)?;
    let trace = service.trace(&args.conversation_id, args.limit).await?;
    Ok(serde_json::to_value(trace)?)
}

// ============================================================================
// TESTS
// ============================================================================
