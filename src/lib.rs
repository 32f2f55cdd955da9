//! Person-scoped retrieval and corroboration for biographical claims.
//!
//! Given a person whose web sources have been fetched, chunked, and
//! embedded ahead of time, the engine verifies a target claim by
//! iteratively retrieving evidence, extracting candidate claim values,
//! resolving source provenance (mirrors and syndicated copies collapse
//! into one source), and counting independent sources until a
//! configurable threshold is met.
//!
//! # Core pieces
//!
//! - [`CorroborationEngine`] drives the round loop over a corpus store
//!   and three provider seams: [`Embedder`], [`Reranker`], and
//!   [`ClaimExtractor`].
//! - [`CorroborationRecord`] is the run's only state: status, accepted
//!   source groups, conflict log, and per-round trace. A cancelled run
//!   resumes from its record.
//! - [`MemoryCorpus`] is the in-memory store; the `cohere` feature adds
//!   HTTP providers for Cohere's embed, rerank, and chat APIs.
//!
//! # Example
//!
//! ```no_run
//! use corroboration::{
//!     ClaimSpec, CorroborationEngine, EngineConfig, MemoryCorpus, Person,
//! };
//! use corroboration::testing::{MockEmbedder, MockExtractor, MockReranker};
//!
//! # async fn run() -> corroboration::Result<()> {
//! let engine = CorroborationEngine::new(
//!     MemoryCorpus::new(),
//!     MockEmbedder::new("embed-v4.0"),
//!     MockReranker::new(),
//!     MockExtractor::new(),
//!     EngineConfig::default(),
//! );
//! let person = Person::new("Amina J. Mohammed");
//! let spec = ClaimSpec::new("hlp_membership", "UN High-Level Panel membership");
//! let record = engine.run(&person, &spec).await?;
//! println!("{:?}: {} independent sources", record.status, record.independent_count());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod providers;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

pub use engine::{CorroborationEngine, DomainOverlapDetector, MirrorDetector, Resolution};
pub use error::{EngineError, Result};
pub use stores::MemoryCorpus;
pub use traits::embedder::Embedder;
pub use traits::extractor::ClaimExtractor;
pub use traits::reranker::{RankedChunk, Reranker};
pub use traits::store::CorpusStore;
pub use types::claim::{ClaimInstance, ClaimSpec, ClaimValue, ExtractOutcome};
pub use types::config::{EngineConfig, ProvenanceConfig, RetryPolicy};
pub use types::corpus::{Chunk, CorpusChunk, Document, Embedding, Person};
pub use types::record::{
    CorroborationRecord, RoundOutcome, RunStatus, SourceGroup, UnconfirmedReason,
};
