//! Alerts Tool
//!
//! Counters that warrant a look: staleness, conflicts, pending flags, and
//! entanglement totals.

use std::sync::Arc;

use braid_core::{MemoryService, Result};
use serde_json::Value;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(service: &Arc<MemoryService>, _args: Option<Value>) -> Result<Value> {
    let alerts = service.alerts().await?;
    Ok(serde_json::to_value(alerts)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_service;
    use braid_core::FlagCategory;

    #[tokio::test]
    async fn counts_start_at_zero_and_track_flags() {
        let service = test_service();
        let result = execute(&service, None).await.unwrap();
        assert_eq!(result["pendingFlags"], 0);
        assert_eq!(result["staleDecisions"], 0);

        service
            .flag("atlas", FlagCategory::Trap, "beware the retry storm", None)
            .await
            .unwrap();
        let result = execute(&service, None).await.unwrap();
        assert_eq!(result["pendingFlags"], 1);
    }
}
