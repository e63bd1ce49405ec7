//! Registries
//!
//! Each record kind is owned by one registry: validation, local-id
//! uniqueness, write-through to the vector store, and the event trail.
//! Registries may be mutated concurrently; each guards its local-id index
//! with a mutex and relies on content-addressed ids for idempotence.

mod decision;
mod thread;

pub use decision::{ConflictReport, DecisionDraft, DecisionRegistry, RegisteredDecision};
pub use thread::{ThreadDraft, ThreadRegistry};
