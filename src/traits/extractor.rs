//! Claim extractor boundary (adapter over an LLM-backed capability).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::claim::{ClaimSpec, ExtractOutcome};
use crate::types::corpus::{CorpusChunk, Person};

/// Extracts zero or one structured claim instance from an evidence window.
///
/// Contract:
/// - "No claim found" is a first-class, non-error outcome.
/// - A `Found` outcome must reference one of the supplied evidence
///   chunks; the engine discards instances with untraceable sources.
/// - Malformed or non-parseable provider output is reported as
///   [`EngineError::MalformedExtraction`](crate::error::EngineError) or
///   swallowed into `NotFound`; it must never panic.
#[async_trait]
pub trait ClaimExtractor: Send + Sync {
    /// Attempt to extract the target claim for `person` from `evidence`.
    async fn extract(
        &self,
        person: &Person,
        spec: &ClaimSpec,
        evidence: &[CorpusChunk],
    ) -> Result<ExtractOutcome>;
}

#[async_trait]
impl<T: ClaimExtractor + ?Sized> ClaimExtractor for std::sync::Arc<T> {
    async fn extract(
        &self,
        person: &Person,
        spec: &ClaimSpec,
        evidence: &[CorpusChunk],
    ) -> Result<ExtractOutcome> {
        (**self).extract(person, spec, evidence).await
    }
}
