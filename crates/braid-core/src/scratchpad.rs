//! Session Scratchpad
//!
//! Process-wide TTL key-value store, partitioned by session key prefix.
//! `get` never returns an expired value; `sweep` is idempotent and safe to
//! run concurrently with reads, which observe either the live value or
//! not-found. Per-key entries live in a `DashMap`, so sweeps and reads
//! never contend on a global lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MemoryError, Result};

/// One scratchpad entry. Destroyed by TTL sweep or explicit delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScratchpadEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
}

impl ScratchpadEntry {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// TTL-bounded session KV store.
#[derive(Debug, Default)]
pub struct Scratchpad {
    entries: DashMap<String, ScratchpadEntry>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` for `ttl_seconds` from `now`.
    pub fn put(&self, key: &str, value: Value, ttl_seconds: i64, now: DateTime<Utc>) -> Result<ScratchpadEntry> {
        if key.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("scratchpad key cannot be empty".to_string()));
        }
        if ttl_seconds <= 0 {
            return Err(MemoryError::InvalidArgument(format!(
                "ttl must be positive, got {ttl_seconds}"
            )));
        }
        let entry = ScratchpadEntry {
            key: key.to_string(),
            value,
            expires_at: now + Duration::seconds(ttl_seconds),
        };
        self.entries.insert(key.to_string(), entry.clone());
        Ok(entry)
    }

    /// Live value for `key`, or `None` once `expires_at < now`. Expired
    /// entries are dropped on the way out.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<ScratchpadEntry> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.value().expired_at(now) {
                return Some(entry.value().clone());
            }
        } else {
            return None;
        }
        // Expired: drop it, re-checking under the entry lock in case a
        // concurrent put refreshed the key since the read above.
        self.entries.remove_if(key, |_, entry| entry.expired_at(now));
        None
    }

    /// Remove a key. Returns true when a live entry was removed.
    pub fn delete(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.expired_at(now))
    }

    /// Drop every expired entry. Idempotent; concurrent gets observe the
    /// live value or not-found, never a torn entry.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.expired_at(now));
        before - self.entries.len()
    }

    /// Live entries whose key starts with `prefix`, sorted by key.
    pub fn snapshot(&self, prefix: &str, now: DateTime<Utc>) -> Vec<ScratchpadEntry> {
        let mut entries: Vec<ScratchpadEntry> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().expired_at(now))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_before_expiry() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        pad.put("s1/cursor", json!({"offset": 42}), 60, now).unwrap();
        let entry = pad.get("s1/cursor", now).unwrap();
        assert_eq!(entry.value, json!({"offset": 42}));
    }

    #[test]
    fn expired_get_is_not_found() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        pad.put("s1/cursor", json!(1), 10, now).unwrap();
        let later = now + Duration::seconds(11);
        assert!(pad.get("s1/cursor", later).is_none());
        // The lazy drop removed the entry entirely.
        assert!(pad.is_empty());
    }

    #[test]
    fn sweep_is_idempotent() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        pad.put("a", json!(1), 10, now).unwrap();
        pad.put("b", json!(2), 100, now).unwrap();
        let later = now + Duration::seconds(50);
        assert_eq!(pad.sweep(later), 1);
        assert_eq!(pad.sweep(later), 0);
        assert!(pad.get("b", later).is_some());
    }

    #[test]
    fn delete_removes_live_entries() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        pad.put("a", json!(1), 10, now).unwrap();
        assert!(pad.delete("a", now));
        assert!(!pad.delete("a", now));
        assert!(pad.get("a", now).is_none());
    }

    #[test]
    fn snapshot_is_prefix_scoped_and_sorted() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        pad.put("s1/b", json!(2), 60, now).unwrap();
        pad.put("s1/a", json!(1), 60, now).unwrap();
        pad.put("s2/a", json!(3), 60, now).unwrap();
        pad.put("s1/expired", json!(4), 1, now).unwrap();

        let later = now + Duration::seconds(30);
        let snapshot = pad.snapshot("s1/", later);
        let keys: Vec<&str> = snapshot.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["s1/a", "s1/b"]);
    }

    #[test]
    fn rejects_empty_key_and_nonpositive_ttl() {
        let pad = Scratchpad::new();
        let now = Utc::now();
        assert_eq!(pad.put("", json!(1), 60, now).unwrap_err().kind(), "invalid_argument");
        assert_eq!(pad.put("k", json!(1), 0, now).unwrap_err().kind(), "invalid_argument");
    }
}
