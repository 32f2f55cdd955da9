//! In-memory corpus store.
//!
//! Backs tests and small batch runs; a persistent store implements the
//! same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::traits::store::CorpusStore;
use crate::types::corpus::{Chunk, CorpusChunk, Document, Embedding, Person};

/// A corpus held in a `RwLock<HashMap>` keyed by person.
///
/// Chunks are validated and ordered at ingestion, so reads are a clone
/// of the stored list.
#[derive(Default)]
pub struct MemoryCorpus {
    chunks: RwLock<HashMap<Person, Vec<CorpusChunk>>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one document's chunks (with their embeddings) to a person's
    /// corpus.
    ///
    /// Validates that every chunk belongs to the document, that ordinals
    /// are strictly increasing, and that no chunk has empty text or an
    /// empty embedding.
    pub async fn ingest_document(
        &self,
        person: &Person,
        document: Document,
        chunks: Vec<(Chunk, Embedding)>,
    ) -> Result<()> {
        let mut previous_ordinal: Option<u32> = None;
        for (chunk, embedding) in &chunks {
            if chunk.document_id != document.id {
                return Err(EngineError::Config(format!(
                    "chunk {} does not belong to document {}",
                    chunk.id, document.id
                )));
            }
            if chunk.token_count == 0 {
                return Err(EngineError::Config(format!("chunk {} is empty", chunk.id)));
            }
            if embedding.dim() == 0 {
                return Err(EngineError::Config(format!(
                    "chunk {} has a zero-dimension embedding",
                    chunk.id
                )));
            }
            if let Some(previous) = previous_ordinal {
                if chunk.ordinal <= previous {
                    return Err(EngineError::Config(format!(
                        "chunk ordinals out of order in document {}",
                        document.id
                    )));
                }
            }
            previous_ordinal = Some(chunk.ordinal);
        }

        let mut map = self.chunks.write().await;
        let corpus = map.entry(person.clone()).or_default();
        for (chunk, embedding) in chunks {
            corpus.push(CorpusChunk {
                person: person.clone(),
                chunk,
                embedding,
                document: document.clone(),
            });
        }
        corpus.sort_by_key(|entry| {
            (
                match entry.document.rank {
                    Some(rank) => (0u8, rank),
                    None => (1, 0),
                },
                entry.chunk.ordinal,
            )
        });
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn list_chunks(&self, person: &Person) -> Result<Vec<CorpusChunk>> {
        let map = self.chunks.read().await;
        Ok(map.get(person).cloned().unwrap_or_default())
    }

    async fn count_chunks(&self, person: &Person) -> Result<usize> {
        let map = self.chunks.read().await;
        Ok(map.get(person).map(Vec::len).unwrap_or(0))
    }
}
