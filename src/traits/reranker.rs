//! Reranker boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::corpus::CorpusChunk;

/// A chunk with its rerank relevance score.
///
/// Scores are not comparable across calls; they only order candidates
/// within one round.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    /// The candidate chunk.
    pub chunk: CorpusChunk,

    /// Cosine similarity from the recall stage.
    pub similarity: f32,

    /// Rerank relevance, if the reranker ran. None when the round fell
    /// back to similarity order after a reranker failure.
    pub relevance: Option<f32>,
}

/// Refines the ordering of a candidate chunk set for a query.
///
/// Cosine similarity on embeddings is a recall mechanism; reranking
/// corrects for lexically dissimilar but semantically on-topic chunks
/// (and vice versa). Implementations must accept an empty candidate list
/// and return an empty list, and must not introduce chunks not present
/// in the input.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `candidates` for `query`, best first, at most `top_n` long.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedChunk>,
        top_n: usize,
    ) -> Result<Vec<RankedChunk>>;
}

#[async_trait]
impl<T: Reranker + ?Sized> Reranker for std::sync::Arc<T> {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedChunk>,
        top_n: usize,
    ) -> Result<Vec<RankedChunk>> {
        (**self).rerank(query, candidates, top_n).await
    }
}
