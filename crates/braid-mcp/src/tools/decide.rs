//! Decide Tool
//!
//! Registers a decision; the response includes any confirmed conflicts so
//! the caller can surface contradictions immediately.

use std::sync::Arc;

use braid_core::{DecisionDraft, MemoryService, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "text": {
                "type": "string",
                "description": "The decision itself"
            },
            "project": {
                "type": "string",
                "description": "Owning project"
            },
            "localId": {
                "type": "string",
                "description": "Project-scoped id, e.g. D042"
            },
            "rationale": {
                "type": "string",
                "description": "Why this was decided"
            },
            "tier": {
                "type": "number",
                "description": "Epistemic tier in [0,1]: >=0.8 validated, 0.3-0.8 heuristic, <0.3 speculative",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "alternatives": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Alternatives considered and rejected"
            },
            "sourceConversation": {
                "type": "string",
                "description": "Conversation the decision came from"
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["text", "project", "localId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideArgs {
    text: String,
    project: String,
    local_id: String,
    rationale: Option<String>,
    tier: Option<f64>,
    #[serde(default)]
    alternatives: Vec<String>,
    source_conversation: Option<String>,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: DecideArgs = parse_args(args)?;
    let registered = service
        .decide(
            DecisionDraft {
                project: args.project,
                local_id: args.local_id,
                text: args.text,
                rationale: args.rationale,
                alternatives_rejected: args.alternatives,
                epistemic_tier: args.tier,
                source_conversation: args.source_conversation,
            },
            deadline_from_ms(args.deadline_ms),
        )
        .await?;
    Ok(serde_json::json!({
        "decision": registered.decision,
        "conflicts": registered.conflicts,
        "replayed": registered.replayed,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
