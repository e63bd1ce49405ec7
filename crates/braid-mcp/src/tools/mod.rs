//! Tool Implementations
//!
//! One module per tool surface. Each exposes `schema()` (the JSON input
//! schema served by `describe`) and `execute()` which parses arguments,
//! calls the service, and returns the JSON result.

pub mod alerts;
pub mod context;
pub mod decide;
pub mod entangle;
pub mod flag;
pub mod pattern;
pub mod recall;
pub mod search;
pub mod session;
pub mod stats;
pub mod thread;
pub mod trace;

use std::time::Duration;

use braid_core::{Deadline, MemoryError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse tool arguments, treating a missing body as an empty object.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T> {
    let value = args.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(value)
        .map_err(|e| MemoryError::InvalidArgument(format!("invalid arguments: {e}")))
}

/// Millisecond deadline from the wire, if the caller set one.
pub(crate) fn deadline_from_ms(deadline_ms: Option<u64>) -> Option<Deadline> {
    deadline_ms.map(|ms| Deadline::after(Duration::from_millis(ms)))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use braid_core::{Config, HashedEmbedder, MemoryService, MemoryVectorStore};

    /// Service over an in-memory store with the deterministic embedder.
    pub(crate) fn test_service() -> Arc<MemoryService> {
        Arc::new(
            MemoryService::new(
                Arc::new(MemoryVectorStore::new()),
                Arc::new(HashedEmbedder::new()),
                Config::default(),
            )
            .unwrap(),
        )
    }
}
