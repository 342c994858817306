//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

use crate::error::Result;

/// Default number of in-flight calls for batch operations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// issues [`embed`](EmbeddingProvider::embed) calls concurrently, at most
/// [`max_concurrency`](EmbeddingProvider::max_concurrency) at a time, and
/// returns the vectors in input order. Backends that support native batching
/// should override it.
///
/// Empty text is valid input and must produce a vector.
///
/// # Example
///
/// ```rust,ignore
/// use ragchain::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The returned vector has the same length and order as `texts`.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let limit = self.max_concurrency().max(1);
        let calls: Vec<_> = texts.iter().map(|text| self.embed(text)).collect();
        stream::iter(calls).buffered(limit).try_collect().await
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Upper bound on concurrent calls issued by the default `embed_batch`.
    fn max_concurrency(&self) -> usize {
        DEFAULT_MAX_CONCURRENCY
    }

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "embedder"
    }
}
