//! Corpus store boundary.
//!
//! The store holds, per person, documents pre-split into chunks with
//! pre-embedded vectors. It is read-only from the engine's side: no run
//! mutates corpus data, so no locking is needed across runs.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::corpus::{CorpusChunk, Person};

/// Read access to a person-scoped chunk corpus.
///
/// Scoping is enforced here, at the data-access boundary: the store must
/// never return chunks for any other person, even on malformed input -
/// it fails closed. The retriever additionally verifies the owning person
/// on every returned chunk and aborts on a mismatch.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// All chunks (with embeddings and document metadata) for one person,
    /// ordered by document rank then chunk ordinal.
    ///
    /// An unknown person yields an empty list, not an error.
    async fn list_chunks(&self, person: &Person) -> Result<Vec<CorpusChunk>>;

    /// Number of chunks in the person's corpus.
    async fn count_chunks(&self, person: &Person) -> Result<usize> {
        Ok(self.list_chunks(person).await?.len())
    }
}

#[async_trait]
impl<T: CorpusStore + ?Sized> CorpusStore for std::sync::Arc<T> {
    async fn list_chunks(&self, person: &Person) -> Result<Vec<CorpusChunk>> {
        (**self).list_chunks(person).await
    }

    async fn count_chunks(&self, person: &Person) -> Result<usize> {
        (**self).count_chunks(person).await
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched dimensions or zero-norm inputs (which can
/// occur with pathologically short chunks) rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
