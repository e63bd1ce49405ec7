//! Entanglement Tool
//!
//! Serves the latest scan snapshot, filtered by similarity floor and
//! minimum cluster size.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::parse_args;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "minSimilarity": {
                "type": "number",
                "description": "Drop resonances and bridges below this cosine",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "minClusterSize": {
                "type": "integer",
                "description": "Drop clusters smaller than this",
                "minimum": 2
            }
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntangleArgs {
    min_similarity: Option<f32>,
    min_cluster_size: Option<usize>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: EntangleArgs = parse_args(args)?;
    let snapshot = service.entanglement(args.min_similarity, args.min_cluster_size).await?;
    Ok(serde_json::to_value(snapshot)?)
}

// ============================================================================
// TESTS
// ============================================================================
