//! Event Log
//!
//! Append-only audit trail of reads and writes. A primary operation that
//! fails mid-way appends nothing; conversely, a log failure never blocks
//! the primary path (registries log the miss and move on).

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Whether an operation observed or mutated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Read,
    Write,
}

/// One audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub kind: EventKind,
    /// Dotted operation name, e.g. `decision.register`.
    pub operation: String,
    /// Ids the operation touched.
    pub ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// In-process append-only log.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Infallible from the caller's point of view: a
    /// poisoned lock is reported via tracing and the entry dropped.
    pub fn append(&self, kind: EventKind, operation: &str, ids: Vec<String>) {
        let record = EventRecord {
            kind,
            operation: operation.to_string(),
            ids,
            timestamp: Utc::now(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(record),
            Err(e) => warn!(operation, error = %e, "event log unavailable, dropping entry"),
        }
    }

    /// Entries within `[start, end]`, in append order.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<EventRecord> {
        match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp <= end)
                .cloned()
                .collect(),
            Err(e) => {
                warn!(error = %e, "event log unavailable for range read");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn append_and_range() {
        let log = EventLog::new();
        let before = Utc::now() - Duration::seconds(1);
        log.append(EventKind::Write, "decision.register", vec!["d1".into()]);
        log.append(EventKind::Read, "recall", vec![]);
        let after = Utc::now() + Duration::seconds(1);

        let all = log.range(before, after);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].operation, "decision.register");
        assert_eq!(all[0].kind, EventKind::Write);
        assert_eq!(all[1].kind, EventKind::Read);
    }

    #[test]
    fn range_excludes_outside_entries() {
        let log = EventLog::new();
        log.append(EventKind::Write, "thread.open", vec!["t1".into()]);
        let past_end = Utc::now() - Duration::hours(1);
        assert!(log.range(past_end - Duration::hours(1), past_end).is_empty());
    }
}
