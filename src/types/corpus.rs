//! Corpus types - people, documents, chunks, and embeddings.
//!
//! The corpus is read-only from the engine's perspective: documents and
//! chunks are created once at ingestion time (external) and never mutated
//! by a corroboration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity key for corpus scoping.
///
/// Every document, chunk, and embedding used in a single run must belong
/// to exactly one person; cross-person leakage is a correctness violation,
/// not noise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    /// Canonical name as stored in the corpus, e.g. "Abhijit Banerjee".
    pub canonical_name: String,
}

impl Person {
    /// Create a person key from a canonical name.
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_name)
    }
}

/// Fetch status of a document at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FetchStatus {
    /// Fetched and extracted successfully.
    #[default]
    Fetched,
    /// Fetched but text extraction was partial.
    Partial,
    /// Fetch failed; document has metadata only.
    Failed,
}

/// One fetched source, owned by a person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier.
    pub id: Uuid,

    /// Origin URL.
    pub url: String,

    /// Publisher domain signature (root domain, lowercased, no "www.").
    ///
    /// Derived from `url` at construction; the basis for the provenance
    /// resolver's same-publisher test.
    pub domain: String,

    /// Page title if available.
    pub title: Option<String>,

    /// Search rank at ingestion time, if the document came from a ranked
    /// search result list. Used only for deterministic tie-breaking.
    pub rank: Option<u32>,

    /// Fetch status at ingestion.
    pub fetch_status: FetchStatus,

    /// When the document was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Document {
    /// Create a document for a URL; the domain signature is derived.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: Uuid::new_v4(),
            domain: domain_signature(&url),
            url,
            title: None,
            rank: None,
            fetch_status: FetchStatus::Fetched,
            fetched_at: Utc::now(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the ingestion search rank.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }
}

/// Extract the publisher domain signature from a URL.
///
/// Root host, lowercased, with a leading "www." stripped. Returns an empty
/// string on malformed input so callers never branch on a parse error;
/// an empty signature matches nothing.
///
/// ```
/// use corroboration::types::corpus::domain_signature;
///
/// assert_eq!(domain_signature("https://www.britannica.com/bio/x"), "britannica.com");
/// assert_eq!(domain_signature("https://en.wikipedia.org/wiki/X"), "en.wikipedia.org");
/// assert_eq!(domain_signature("not a url"), "");
/// ```
pub fn domain_signature(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("").to_lowercase();
            host.strip_prefix("www.").unwrap_or(&host).to_string()
        }
        Err(_) => String::new(),
    }
}

/// A contiguous text window of a document, the unit of retrieval.
///
/// Chunks of a document are non-overlapping and ordered by `ordinal`;
/// token length is bounded by the chunking process (1..=window size).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier.
    pub id: Uuid,

    /// Parent document.
    pub document_id: Uuid,

    /// Position within the document (0-based).
    pub ordinal: u32,

    /// Token count of `text`.
    pub token_count: u32,

    /// The chunk text.
    pub text: String,
}

impl Chunk {
    /// Create a chunk of a document.
    pub fn new(document_id: Uuid, ordinal: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        // Whitespace token count; the real tokenizer lives upstream.
        let token_count = text.split_whitespace().count() as u32;
        Self {
            id: Uuid::new_v4(),
            document_id,
            ordinal,
            token_count,
            text,
        }
    }
}

/// A fixed-dimension embedding in a named model's vector space.
///
/// Similarity comparisons are only valid between embeddings of the same
/// model version, so the model travels with the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Embedding model version, e.g. "embed-v4.0".
    pub model: String,

    /// Dense vector.
    pub vector: Vec<f32>,
}

impl Embedding {
    /// Create an embedding.
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk joined with its embedding and document metadata, as returned
/// by the corpus store. Carries the owning person so scope checks can
/// fail closed at the retrieval boundary.
#[derive(Debug, Clone)]
pub struct CorpusChunk {
    /// Owning person (for scope verification, not filtering).
    pub person: Person,

    /// The chunk itself.
    pub chunk: Chunk,

    /// The chunk's stored embedding.
    pub embedding: Embedding,

    /// Parent document metadata.
    pub document: Document,
}
