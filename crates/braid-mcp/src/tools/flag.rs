//! Flag Tool
//!
//! Raises an expedition flag; new flags are always pending.

use std::sync::Arc;

use braid_core::{FlagCategory, MemoryError, MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "enum": ["inversion", "isomorphism", "fsd", "manifestation", "trap", "general"],
                "description": "Flag category"
            },
            "description": {
                "type": "string",
                "description": "The observation worth bookmarking"
            },
            "project": {
                "type": "string",
                "description": "Owning project"
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["category", "description", "project"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagArgs {
    category: String,
    description: String,
    project: String,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: FlagArgs = parse_args(args)?;
    let category = FlagCategory::parse_name(&args.category)
        .ok_or_else(|| MemoryError::InvalidArgument(format!("unknown category {}", args.category)))?;
    let flag = service
        .flag(&args.project, category, &args.description, deadline_from_ms(args.deadline_ms))
        .await?;
    Ok(serde_json::to_value(flag)?)
}

// ============================================================================
// TESTS
// ============================================================================
