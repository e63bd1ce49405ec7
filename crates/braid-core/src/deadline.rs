//! Call Deadlines
//!
//! Every externally reachable operation accepts an optional deadline. On
//! expiry the operation stops issuing new downstream calls and returns
//! `deadline_exceeded`; `recall` alone may return the collections that
//! completed plus degraded markers for the rest.

use std::time::{Duration, Instant};

use crate::error::{MemoryError, Result};

/// An absolute point in time after which an operation must stop issuing
/// downstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self { at: Instant::now() + timeout }
    }

    /// Time left before expiry, `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.checked_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// Fail fast if an optional deadline has already expired.
pub fn check(deadline: Option<Deadline>) -> Result<()> {
    match deadline {
        Some(d) if d.expired() => Err(MemoryError::DeadlineExceeded),
        _ => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_passes() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.expired());
        assert!(check(Some(d)).is_ok());
        assert!(check(None).is_ok());
    }

    #[test]
    fn expired_deadline_fails() {
        let d = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(d.expired());
        let err = check(Some(d)).unwrap_err();
        assert_eq!(err.kind(), "deadline_exceeded");
    }
}
