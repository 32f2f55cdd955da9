//! Deterministic test doubles for the provider traits.
//!
//! Each mock tracks its calls and supports failure injection so tests can
//! exercise the retry and degradation paths without a network. Hash-based
//! embeddings are deterministic for identical input, matching the
//! embedder contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::traits::embedder::Embedder;
use crate::traits::extractor::ClaimExtractor;
use crate::traits::reranker::{RankedChunk, Reranker};
use crate::types::claim::{ClaimInstance, ClaimSpec, ClaimValue, ExtractOutcome};
use crate::types::corpus::{CorpusChunk, Embedding, Person};

fn injected_failure(counter: &AtomicU32, operation: &'static str) -> Result<()> {
    let took_one = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if took_one {
        Err(EngineError::provider(
            operation,
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected failure"),
        ))
    } else {
        Ok(())
    }
}

/// Deterministic embedding derived from the text's SHA-256 digest.
///
/// All components are positive, so any two hashed vectors have a cosine
/// similarity well above the default floor; tests that need specific
/// orderings pin exact vectors with
/// [`MockEmbedder::with_embedding`].
pub fn hashed_vector(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| *byte as f32 / 255.0 + 0.1)
        .collect()
}

/// Mock embedder: pinned vectors for known texts, hash-derived vectors
/// otherwise.
pub struct MockEmbedder {
    model: String,
    pinned: HashMap<String, Vec<f32>>,
    fail_times: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl MockEmbedder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            pinned: HashMap::new(),
            fail_times: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pin an exact vector for an exact input text.
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), vector);
        self
    }

    /// Fail the next `times` calls with a transient provider error.
    pub fn failing(self, times: u32) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    /// Queries embedded so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.lock().await.push(text.to_string());
        injected_failure(&self.fail_times, "embed")?;
        let vector = self
            .pinned
            .get(text)
            .cloned()
            .unwrap_or_else(|| hashed_vector(text));
        Ok(Embedding::new(self.model.clone(), vector))
    }

    fn model_version(&self) -> &str {
        &self.model
    }
}

/// Mock reranker: moves chunks containing a boost substring to the front,
/// otherwise preserves the input order.
#[derive(Default)]
pub struct MockReranker {
    boosts: Vec<String>,
    fail_times: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl MockReranker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks whose text contains `needle` rank first, in boost order.
    pub fn boosting(mut self, needle: impl Into<String>) -> Self {
        self.boosts.push(needle.into());
        self
    }

    /// Fail the next `times` calls with a transient provider error.
    pub fn failing(self, times: u32) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    /// Queries reranked so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedChunk>,
        top_n: usize,
    ) -> Result<Vec<RankedChunk>> {
        self.calls.lock().await.push(query.to_string());
        injected_failure(&self.fail_times, "rerank")?;

        let boost_key = |candidate: &RankedChunk| {
            self.boosts
                .iter()
                .position(|needle| candidate.chunk.chunk.text.contains(needle.as_str()))
                .unwrap_or(self.boosts.len())
        };
        let mut ordered = candidates;
        ordered.sort_by_key(boost_key);

        let count = ordered.len();
        Ok(ordered
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(position, mut candidate)| {
                candidate.relevance = Some(1.0 - position as f32 / count.max(1) as f32);
                candidate
            })
            .collect())
    }
}

/// A pattern rule for the mock extractor: the first evidence chunk whose
/// text contains `pattern` yields `value`.
pub struct ExtractionRule {
    pattern: String,
    value: ClaimValue,
    confidence: f32,
}

/// Mock extractor driven by substring rules over the evidence window.
#[derive(Default)]
pub struct MockExtractor {
    rules: Vec<ExtractionRule>,
    fail_times: AtomicU32,
    malformed_times: AtomicU32,
    call_count: AtomicU32,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule: evidence containing `pattern` yields `value`.
    pub fn rule(mut self, pattern: impl Into<String>, value: ClaimValue, confidence: f32) -> Self {
        self.rules.push(ExtractionRule {
            pattern: pattern.into(),
            value,
            confidence,
        });
        self
    }

    /// Fail the next `times` calls with a transient provider error.
    pub fn failing(self, times: u32) -> Self {
        self.fail_times.store(times, Ordering::SeqCst);
        self
    }

    /// Return malformed output for the next `times` calls.
    pub fn malformed(self, times: u32) -> Self {
        self.malformed_times.store(times, Ordering::SeqCst);
        self
    }

    /// Number of extract calls so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimExtractor for MockExtractor {
    async fn extract(
        &self,
        _person: &Person,
        _spec: &ClaimSpec,
        evidence: &[CorpusChunk],
    ) -> Result<ExtractOutcome> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        injected_failure(&self.fail_times, "extract")?;

        let malformed = self
            .malformed_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if malformed {
            return Err(EngineError::MalformedExtraction {
                raw: "```json\n{\"claim\": tru".to_string(),
            });
        }

        for chunk in evidence {
            for rule in &self.rules {
                if chunk.chunk.text.contains(rule.pattern.as_str()) {
                    return Ok(ExtractOutcome::Found(ClaimInstance {
                        value: rule.value.clone(),
                        chunk_id: chunk.chunk.id,
                        document_id: chunk.document.id,
                        domain: chunk.document.domain.clone(),
                        evidence_text: chunk.chunk.text.clone(),
                        confidence: rule.confidence,
                        justification: format!("evidence states '{}'", rule.pattern),
                    }));
                }
            }
        }
        Ok(ExtractOutcome::NotFound)
    }
}
