//! Thread Tool
//!
//! One write surface with three operations: open, resolve, block. Resolve
//! demands a resolution text; resolved threads are terminal.

use std::sync::Arc;

use braid_core::{MemoryError, MemoryService, Priority, Result, ThreadDraft};
use serde::Deserialize;
use serde_json::Value;

use super::{deadline_from_ms, parse_args};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "op": {
                "type": "string",
                "enum": ["open", "resolve", "block"],
                "description": "What to do"
            },
            "project": {
                "type": "string",
                "description": "Owning project"
            },
            "localId": {
                "type": "string",
                "description": "Project-scoped id, e.g. T017; also accepts the record id for resolve/block"
            },
            "title": {
                "type": "string",
                "description": "Thread title (open)"
            },
            "description": {
                "type": "string",
                "description": "Thread body (open)"
            },
            "priority": {
                "type": "string",
                "enum": ["high", "medium", "low"],
                "description": "Priority (open, default: medium)"
            },
            "resolution": {
                "type": "string",
                "description": "Resolution text (resolve; required)"
            },
            "blockers": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Blocking references (block; empty list reopens)"
            },
            "sourceConversation": {
                "type": "string",
                "description": "Conversation the thread came from (open)"
            },
            "deadlineMs": {
                "type": "integer",
                "description": "Call deadline in milliseconds"
            }
        },
        "required": ["op", "project", "localId"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadArgs {
    op: String,
    project: String,
    local_id: String,
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    resolution: Option<String>,
    #[serde(default)]
    blockers: Vec<String>,
    source_conversation: Option<String>,
    deadline_ms: Option<u64>,
}

pub async fn execute(service: &Arc<MemoryService>, args: Option<Value>) -> Result<Value> {
    let args: ThreadArgs = parse_args(args)?;
    let thread = match args.op.as_str() {
        "open" => {
            let title = args.title.ok_or_else(|| {
                MemoryError::InvalidArgument("open requires a title".to_string())
            })?;
            let priority = match args.priority.as_deref() {
                Some(p) => Some(Priority::parse_name(p).ok_or_else(|| {
                    MemoryError::InvalidArgument(format!("unknown priority {p}"))
                })?),
                None => None,
            };
            service
                .thread_open(
                    ThreadDraft {
                        project: args.project,
                        local_id: args.local_id,
                        title,
                        description: args.description.unwrap_or_default(),
                        priority,
                        source_conversation: args.source_conversation,
                    },
                    deadline_from_ms(args.deadline_ms),
                )
                .await?
        }
        "resolve" => {
            let resolution = args.resolution.ok_or_else(|| {
                MemoryError::InvalidArgument("resolve requires a resolution".to_string())
            })?;
            service
                .thread_resolve(&args.project, &args.local_id, &resolution)
                .await?
        }
        "block" => {
            service
                .thread_block(&args.project, &args.local_id, args.blockers)
                .await?
        }
        other => {
            return Err(MemoryError::InvalidArgument(format!("unknown thread op {other}")));
        }
    };
    Ok(serde_json::to_value(thread)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;

    #[tokio::test]
    async fn open_resolve_lifecycle() {
        let service = test_service();
        let open = serde_json::json!({
            "op": "open",
            "project": "atlas",
            "localId": "T001",
            "title": "Ship replication",
            "priority": "high"
        });
        let result = execute(&service, Some(open)).await.unwrap();
        assert_eq!(result["status"], "open");
        assert_eq!(result["priority"], "high");

        let resolve = serde_json::json!({
            "op": "resolve",
            "project": "atlas",
            "localId": "T001",
            "resolution": "replication shipped behind a flag"
        });
        let result = execute(&service, Some(resolve)).await.unwrap();
        assert_eq!(result["status"], "resolved");
        assert_eq!(result["resolution"], "replication shipped behind a flag");
    }

    #[tokio::test]
    async fn resolve_without_text_is_invalid() {
        let service = test_service();
        execute(
            &service,
            Some(serde_json::json!({
                "op": "open", "project": "atlas", "localId": "T001", "title": "Ship replication"
            })),
        )
        .await
        .unwrap();

        let err = execute(
            &service,
            Some(serde_json::json!({ "op": "resolve", "project": "atlas", "localId": "T001" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn block_then_reopen() {
        let service = test_service();
        execute(
            &service,
            Some(serde_json::json!({
                "op": "open", "project": "atlas", "localId": "T001", "title": "Ship replication"
            })),
        )
        .await
        .unwrap();

        let blocked = execute(
            &service,
            Some(serde_json::json!({
                "op": "block", "project": "atlas", "localId": "T001", "blockers": ["T000"]
            })),
        )
        .await
        .unwrap();
        assert_eq!(blocked["status"], "blocked");

        let reopened = execute(
            &service,
            Some(serde_json::json!({
                "op": "block", "project": "atlas", "localId": "T001", "blockers": []
            })),
        )
        .await
        .unwrap();
        assert_eq!(reopened["status"], "open");
    }

    #[tokio::test]
    async fn unknown_op_is_invalid() {
        let service = test_service();
        let err = execute(
            &service,
            Some(serde_json::json!({ "op": "pause", "project": "atlas", "localId": "T001" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
