//! Pattern Tool
//!
//! Registers a pattern; near-duplicates merge and the response says so.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "text": {
                "type": "string",
                "description": "The recurring observation"
            },
            "confidence": {
                "type": "number",
                "description": "Confidence in [0,1] (default: 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "project": {
                "type": "string",
                "description": "Owning project (default: shared)"
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["text"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatternArgs {
    text: String,
    confidence: Option<f64>,
    project: Option<String>,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: PatternArgs = parse_args(args)?;
    let project = args.project.unwrap_or_else(|| "shared".to_string());
    let outcome = service
        .pattern(&project, &args.text, args.confidence, deadline_from_ms(args.deadline_ms))
        .await?;
    Ok(serde_json::to_value(outcome)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;

    #[tokio::test]
    async fn repeat_registration_reports_merge() {
        let service = test_service();
        let args = serde_json::json!({ "text": "retries mask configuration errors", "confidence": 0.6 });
        let first = execute(&service, Some(args.clone())).await.unwrap();
        assert_eq!(first["merged"], false);

        let second = execute(&service, Some(args)).await.unwrap();
        assert_eq!(second["merged"], true);
        assert_eq!(second["pattern"]["mergeCount"], 1);
    }
}
