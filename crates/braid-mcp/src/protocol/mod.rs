//! Tool-Dispatch Protocol
//!
//! Newline-delimited JSON envelopes over stdio. The same request/response
//! shapes ride any transport; stdio is the one bundled here.

pub mod stdio;
pub mod types;
