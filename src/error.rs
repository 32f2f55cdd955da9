//! Typed errors for the corroboration engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! The taxonomy mirrors how failures are handled: scope violations are
//! fatal and abort the run, provider failures are retried and then degrade
//! to "no result this round", malformed extractor output becomes a
//! not-found outcome, and corpus exhaustion is not an error at all (it is
//! the `unconfirmed` terminal status).

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during a corroboration run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A retrieval result referenced a document outside the requested
    /// person's corpus. Data-integrity breach; aborts the run.
    #[error("scope violation: document {document} does not belong to person '{person}'")]
    ScopeViolation { person: String, document: Uuid },

    /// An external provider (embedder, reranker, extractor) failed.
    ///
    /// Transient by assumption; callers retry with backoff and degrade
    /// to a no-result round once retries are exhausted.
    #[error("provider error during {operation}: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A provider call exceeded its hard deadline.
    #[error("timeout during {operation}")]
    Timeout { operation: &'static str },

    /// Extractor output could not be parsed into the claim schema.
    ///
    /// Provider adapters normally swallow this into a not-found outcome;
    /// the variant exists so adapters can signal it explicitly and the
    /// raw output is retained for audit.
    #[error("malformed extraction output")]
    MalformedExtraction { raw: String },

    /// Corpus store operation failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid claim specification or engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// JSON parsing error (provider wire formats, persisted records).
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Provider { .. } | EngineError::Timeout { .. }
        )
    }

    /// Convenience constructor for provider failures.
    pub fn provider(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngineError::Provider {
            operation,
            source: Box::new(source),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
