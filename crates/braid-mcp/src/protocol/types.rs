//! Envelope Types
//!
//! One request per line: `{"id": ..., "tool": "...", "args": {...}}`.
//! Responses echo the id and carry either `result` or a typed error
//! `{kind, message, retriable}` so clients know what is safe to replay.

use braid_core::MemoryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An incoming tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Client-chosen correlation id, echoed back verbatim.
    #[serde(default)]
    pub id: Option<Value>,
    pub tool: String,
    #[serde(default)]
    pub args: Option<Value>,
}

/// The wire form of an engine error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    pub retriable: bool,
}

impl From<&MemoryError> for ToolError {
    fn from(err: &MemoryError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retriable: err.retriable(),
        }
    }
}

/// An outgoing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn failure(id: Option<Value>, err: &MemoryError) -> Self {
        Self { id, result: None, error: Some(ToolError::from(err)) }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_id() {
        let with: ToolRequest =
            serde_json::from_str(r#"{"id": 7, "tool": "stats", "args": {}}"#).unwrap();
        assert_eq!(with.tool, "stats");
        assert_eq!(with.id, Some(Value::from(7)));

        let without: ToolRequest = serde_json::from_str(r#"{"tool": "alerts"}"#).unwrap();
        assert!(without.id.is_none());
        assert!(without.args.is_none());
    }

    #[test]
    fn error_envelope_carries_kind_and_retriable() {
        let err = MemoryError::Unavailable("embedder down".to_string());
        let response = ToolResponse::failure(Some(Value::from(1)), &err);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["kind"], "unavailable");
        assert_eq!(json["error"]["retriable"], true);
        assert!(json.get("result").is_none());
    }
}
