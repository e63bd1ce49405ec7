//! Error Taxonomy
//!
//! Every error the engine can surface maps to one of seven wire kinds,
//! each carrying a `retriable` hint. Writes are keyed by deterministic
//! ids, so clients may replay `retriable` failures without duplicating
//! state.

use thiserror::Error;

/// Engine error type
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Input failed schema or contract validation. Nothing was written.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write collides with existing state (duplicate local id,
    /// illegal state transition, lineage cycle).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's deadline expired before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A partial result was possible but some collections failed.
    #[error("degraded: {0}")]
    Degraded(String),

    /// A downstream dependency (embedder, vector store) failed after
    /// retries were exhausted.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An internal invariant broke. Not retriable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Wire-level error kind, stable across versions.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::InvalidArgument(_) => "invalid_argument",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::Conflict(_) => "conflict",
            MemoryError::DeadlineExceeded => "deadline_exceeded",
            MemoryError::Degraded(_) => "degraded",
            MemoryError::Unavailable(_) => "unavailable",
            MemoryError::Internal(_) => "internal",
        }
    }

    /// Whether a client may safely retry the operation.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            MemoryError::DeadlineExceeded
                | MemoryError::Degraded(_)
                | MemoryError::Unavailable(_)
        )
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Unavailable(format!("sqlite: {e}"))
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Internal(format!("payload encoding: {e}"))
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(MemoryError::InvalidArgument("x".into()).kind(), "invalid_argument");
        assert_eq!(MemoryError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(MemoryError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(MemoryError::DeadlineExceeded.kind(), "deadline_exceeded");
        assert_eq!(MemoryError::Degraded("x".into()).kind(), "degraded");
        assert_eq!(MemoryError::Unavailable("x".into()).kind(), "unavailable");
        assert_eq!(MemoryError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn retriable_follows_kind() {
        assert!(MemoryError::Unavailable("x".into()).retriable());
        assert!(MemoryError::DeadlineExceeded.retriable());
        assert!(!MemoryError::InvalidArgument("x".into()).retriable());
        assert!(!MemoryError::Conflict("x".into()).retriable());
        assert!(!MemoryError::Internal("x".into()).retriable());
    }
}
