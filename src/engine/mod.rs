//! The corroboration engine: retrieval, provenance resolution, and the
//! round loop.

pub mod corroborate;
pub mod provenance;
mod retrieve;
mod retry;

pub use corroborate::CorroborationEngine;
pub use provenance::{
    DomainOverlapDetector, MirrorDetector, ProvenanceResolver, Resolution, SourceSignature,
};
