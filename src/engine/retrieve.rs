//! Person-scoped similarity retrieval.
//!
//! Recall stage of each round: score every not-yet-examined chunk in the
//! person's corpus against the round query embedding, keep those above
//! the similarity floor, and return the top candidates in a deterministic
//! order for the reranker.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::traits::reranker::RankedChunk;
use crate::traits::store::{cosine_similarity, CorpusStore};
use crate::types::config::EngineConfig;
use crate::types::corpus::{CorpusChunk, Embedding, Person};

/// Fetch and rank candidate chunks for one round.
///
/// Chunks already examined in earlier rounds are excluded, which is what
/// makes the round loop terminate. Returns an empty list when the corpus
/// is exhausted (or empty); that is a state transition for the caller,
/// not an error.
pub(crate) async fn rank_candidates<S>(
    store: &S,
    person: &Person,
    query: &Embedding,
    examined: &BTreeSet<Uuid>,
    config: &EngineConfig,
) -> Result<Vec<RankedChunk>>
where
    S: CorpusStore + ?Sized,
{
    let chunks = store.list_chunks(person).await?;
    rank(person, chunks, query, examined, config)
}

/// Score, filter, and order candidates. Pure so it can be tested without
/// a store.
pub(crate) fn rank(
    person: &Person,
    chunks: Vec<CorpusChunk>,
    query: &Embedding,
    examined: &BTreeSet<Uuid>,
    config: &EngineConfig,
) -> Result<Vec<RankedChunk>> {
    let mut candidates = Vec::new();

    for corpus_chunk in chunks {
        // A chunk from another person's corpus is a data-integrity breach,
        // not something to filter out quietly.
        if corpus_chunk.person != *person {
            return Err(EngineError::ScopeViolation {
                person: person.canonical_name.clone(),
                document: corpus_chunk.document.id,
            });
        }

        if examined.contains(&corpus_chunk.chunk.id) {
            continue;
        }

        // Similarity across embedding models is meaningless; skip rather
        // than produce a garbage score.
        if corpus_chunk.embedding.model != query.model {
            tracing::warn!(
                chunk = %corpus_chunk.chunk.id,
                chunk_model = %corpus_chunk.embedding.model,
                query_model = %query.model,
                "skipping chunk embedded under a different model"
            );
            continue;
        }

        let similarity = cosine_similarity(&query.vector, &corpus_chunk.embedding.vector);
        if similarity < config.min_similarity {
            continue;
        }

        candidates.push(RankedChunk {
            chunk: corpus_chunk,
            similarity,
            relevance: None,
        });
    }

    candidates.sort_by(compare_candidates);
    candidates.truncate(config.similarity_top_k);
    Ok(candidates)
}

/// Similarity descending, then document search rank ascending (ranked
/// documents before unranked), then chunk ordinal. Total, so candidate
/// order never depends on store iteration order.
fn compare_candidates(a: &RankedChunk, b: &RankedChunk) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| rank_key(a).cmp(&rank_key(b)))
        .then_with(|| a.chunk.chunk.ordinal.cmp(&b.chunk.chunk.ordinal))
        .then_with(|| a.chunk.chunk.id.cmp(&b.chunk.chunk.id))
}

fn rank_key(candidate: &RankedChunk) -> (u8, u32) {
    match candidate.chunk.document.rank {
        Some(rank) => (0, rank),
        None => (1, 0),
    }
}
