//! Domain layer types and invariants.

pub mod record;
pub mod stats;
