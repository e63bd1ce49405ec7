//! Deterministic Identity
//!
//! Every record id is a UUID v5 over `(collection, project, discriminator)`.
//! The same logical record always hashes to the same id, which makes
//! upserts idempotent and retried writes safe.

use uuid::Uuid;

/// Namespace for all braid record ids.
/// Fixed so ids are stable across processes and machines.
const BRAID_NAMESPACE: Uuid = Uuid::from_u128(0x8f64_a1d2_74c3_41b8_9e0a_5b2d_6c7e_3f19);

/// Deterministic id for a record in a collection.
///
/// The discriminator is the record's natural key: a decision's local id,
/// a pattern's text, an edge's `source->target` pair.
pub fn record_id(collection: &str, project: &str, discriminator: &str) -> String {
    let name = format!("{collection}:{project}:{discriminator}");
    Uuid::new_v5(&BRAID_NAMESPACE, name.as_bytes()).to_string()
}

/// Deterministic id for a lineage edge.
pub fn edge_id(source_conversation: &str, target_conversation: &str) -> String {
    record_id("lineage", "", &format!("{source_conversation}->{target_conversation}"))
}

/// Random id for ephemeral things (session keys, scan run ids).
pub fn ephemeral_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_deterministic() {
        let a = record_id("decisions", "atlas", "D042");
        let b = record_id("decisions", "atlas", "D042");
        assert_eq!(a, b);
    }

    #[test]
    fn record_ids_separate_by_collection_and_project() {
        let base = record_id("decisions", "atlas", "D042");
        assert_ne!(base, record_id("threads", "atlas", "D042"));
        assert_ne!(base, record_id("decisions", "hermes", "D042"));
        assert_ne!(base, record_id("decisions", "atlas", "D043"));
    }

    #[test]
    fn edge_ids_are_directional() {
        assert_ne!(edge_id("c1", "c2"), edge_id("c2", "c1"));
        assert_eq!(edge_id("c1", "c2"), edge_id("c1", "c2"));
    }

    #[test]
    fn ephemeral_ids_differ() {
        assert_ne!(ephemeral_id(), ephemeral_id());
    }
}
