//! Embedder boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::corpus::Embedding;

/// Maps a query string to a vector in the same space as the stored chunk
/// embeddings.
///
/// Implementations must be deterministic for identical input and model
/// version. The returned [`Embedding`] carries its model version because
/// similarity comparisons across models are invalid; the engine records
/// the version on the run output and skips chunks embedded under a
/// different model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a retrieval query.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// The model version [`embed`](Self::embed) produces vectors for.
    fn model_version(&self) -> &str;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text).await
    }

    fn model_version(&self) -> &str {
        (**self).model_version()
    }
}
