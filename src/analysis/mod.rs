//! Analysis and result aggregation modules
//!
//! Turns onset envelopes into a final tempo:
//! - Candidate types and scalar coercion
//! - Concurrent candidate generators
//! - Plausibility filtering and fusion
//! - Result types and metadata

pub mod aggregate;
pub mod candidates;
pub mod generators;
pub mod metadata;
pub mod result;
