//! Engine configuration.
//!
//! All tunables (thresholds, retry counts, round caps) are carried in an
//! explicit config value threaded into the engine's constructor, never
//! read from ambient state, so runs are independently testable and
//! reproducible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a corroboration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cosine-scored candidates passed to the reranker per round.
    pub similarity_top_k: usize,

    /// Minimum cosine similarity for a chunk to be a candidate at all.
    pub min_similarity: f32,

    /// Candidates kept after reranking.
    pub rerank_top_n: usize,

    /// Top-ranked chunks handed to the extractor each round. Every chunk
    /// in the window is marked examined whether or not a claim is found.
    pub evidence_window: usize,

    /// Independent sources required to confirm. A single source, however
    /// confident, is never sufficient.
    pub required_sources: usize,

    /// Optional cap on rounds. Termination is already guaranteed by the
    /// examined-chunk set; the cap only bounds cost on large corpora.
    pub max_rounds: Option<u32>,

    /// Retry policy for provider calls.
    pub retry: RetryPolicy,

    /// Same-source detection tunables.
    pub provenance: ProvenanceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 20,
            min_similarity: 0.15,
            rerank_top_n: 10,
            evidence_window: 1,
            required_sources: 2,
            max_rounds: None,
            retry: RetryPolicy::default(),
            provenance: ProvenanceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of independent sources required to confirm.
    pub fn with_required_sources(mut self, count: usize) -> Self {
        self.required_sources = count;
        self
    }

    /// Set the similarity floor.
    pub fn with_min_similarity(mut self, min: f32) -> Self {
        self.min_similarity = min;
        self
    }

    /// Set the round cap.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = Some(max);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the provenance tunables.
    pub fn with_provenance(mut self, provenance: ProvenanceConfig) -> Self {
        self.provenance = provenance;
        self
    }
}

/// Bounded retry with exponential backoff and a hard per-call deadline.
///
/// Applied to every embedder, reranker, and extractor call. A call that
/// exhausts its retries degrades to "no result this round" rather than
/// aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles per attempt.
    pub initial_backoff: Duration,

    /// Backoff ceiling.
    pub max_backoff: Duration,

    /// Hard deadline for a single attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff duration before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Tunables for the same-source heuristic.
///
/// Mirror detection is inherently heuristic, so the thresholds are
/// configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceConfig {
    /// Jaccard overlap of word shingles at or above which two evidence
    /// texts are considered near-duplicates.
    pub overlap_threshold: f64,

    /// Words per shingle for the overlap test.
    pub shingle_len: usize,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.85,
            shingle_len: 4,
        }
    }
}
