//! Tool Server
//!
//! Routes envelope requests to tool handlers. Fourteen operations plus
//! `describe`, which lists them with their input schemas.

use std::sync::Arc;

use braid_core::{MemoryError, MemoryService};
use serde_json::Value;
use tracing::debug;

use crate::protocol::types::{ToolRequest, ToolResponse};
use crate::tools;

/// Dispatch table over one [`MemoryService`].
pub struct ToolServer {
    service: Arc<MemoryService>,
}

impl ToolServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        debug!(tool = %request.tool, "handling request");
        let ToolRequest { id, tool, args } = request;
        let result = self.dispatch(&tool, args).await;
        match result {
            Ok(value) => ToolResponse::success(id, value),
            Err(err) => ToolResponse::failure(id, &err),
        }
    }

    async fn dispatch(&self, tool: &str, args: Option<Value>) -> Result<Value, MemoryError> {
        let service = &self.service;
        match tool {
            // Reads
            "recall" => tools::recall::execute(service, args).await,
            "project_context" => tools::context::execute(service, args).await,
            "entanglement" => tools::entangle::execute(service, args).await,
            "trace" => tools::trace::execute(service, args).await,
            "alerts" => tools::alerts::execute(service, args).await,
            "search" => tools::search::execute(service, args).await,
            "stats" => tools::stats::execute_stats(service, args).await,
            "projects" => tools::stats::execute_projects(service, args).await,
            "session" => tools::session::execute_session(service, args).await,
            // Writes
            "decide" => tools::decide::execute(service, args).await,
            "thread" => tools::thread::execute(service, args).await,
            "flag" => tools::flag::execute(service, args).await,
            "pattern" => tools::pattern::execute(service, args).await,
            "remember" => tools::session::execute_remember(service, args).await,
            // Introspection
            "describe" => Ok(describe()),
            other => Err(MemoryError::InvalidArgument(format!("unknown tool {other}"))),
        }
    }
}

/// The tool roster with input schemas.
pub fn describe() -> Value {
    let entry = |name: &str, kind: &str, schema: Value| {
        serde_json::json!({ "name": name, "kind": kind, "inputSchema": schema })
    };
    serde_json::json!({
        "tools": [
            entry("recall", "read", tools::recall::schema()),
            entry("project_context", "read", tools::context::schema()),
            entry("entanglement", "read", tools::entangle::schema()),
            entry("trace", "read", tools::trace::schema()),
            entry("alerts", "read", tools::alerts::schema()),
            entry("search", "read", tools::search::schema()),
            entry("stats", "read", tools::stats::stats_schema()),
            entry("projects", "read", tools::stats::projects_schema()),
            entry("session", "read", tools::session::session_schema()),
            entry("decide", "write", tools::decide::schema()),
            entry("thread", "write", tools::thread::schema()),
            entry("flag", "write", tools::flag::schema()),
            entry("pattern", "write", tools::pattern::schema()),
            entry("remember", "write", tools::session::remember_schema()),
        ]
    })
}

// ============================================================================
// TESTS
// ============================================================================
