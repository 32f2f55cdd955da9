//! Core trait abstractions.
//!
//! Every external collaborator sits behind a trait seam so the engine can
//! be exercised with deterministic mocks.

pub mod embedder;
pub mod extractor;
pub mod reranker;
pub mod store;
