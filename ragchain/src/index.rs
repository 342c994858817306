//! In-memory vector index using exact cosine similarity.
//!
//! [`VectorIndex`] owns its entries behind a `tokio::sync::RwLock` and embeds
//! documents through an [`EmbeddingProvider`]. Queries are a dense linear
//! scan, which keeps top-k results exact.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchain::{Document, VectorIndex};
//!
//! let index = VectorIndex::new(Arc::new(my_embedder));
//! index.insert(&[Document::new("Cats are independent pets.")]).await?;
//! let results = index.query("cat", 1).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::document::{Document, DocumentId, IndexEntry, RetrievalRequest, SimilarityResult};
use crate::embedding::{DEFAULT_MAX_CONCURRENCY, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::timeout::with_timeout;

/// Default deadline for a single embedding call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    dimensions: Option<usize>,
    next_id: u64,
}

/// An in-memory vector index answering exact top-k cosine similarity queries.
///
/// Entries are kept in insertion order, which is also the tie-break order
/// for equal scores. Whole [`insert`](VectorIndex::insert) calls are
/// serialized against each other and applied under a single write guard, so
/// concurrent queries observe either the state before a batch or after it.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    state: RwLock<IndexState>,
    insert_lock: Mutex<()>,
    embed_timeout: Duration,
    max_concurrency: usize,
}

impl VectorIndex {
    /// Create an empty index with default timeout and concurrency settings.
    ///
    /// The dimension is established by the first inserted batch.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            state: RwLock::new(IndexState::default()),
            insert_lock: Mutex::new(()),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Create a new [`VectorIndexBuilder`].
    pub fn builder() -> VectorIndexBuilder {
        VectorIndexBuilder::default()
    }

    /// Return a reference to the embedding provider.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the index holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// The vector dimension shared by all entries, once established.
    pub async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }

    /// Look up a stored document by id.
    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        let state = self.state.read().await;
        state.entries.iter().find(|entry| entry.id == id).map(|entry| entry.document.clone())
    }

    /// Embed and store a batch of documents.
    ///
    /// Returns the ids assigned to the documents, in input order. The batch
    /// is all-or-nothing: if any embedding fails or has the wrong dimension,
    /// nothing is stored.
    ///
    /// The batch is embedded in rounds of the embedder's
    /// [`max_concurrency`](EmbeddingProvider::max_concurrency) calls, and
    /// each round gets the full `embed_timeout`.
    ///
    /// # Errors
    ///
    /// - [`RagError::Embedding`] / [`RagError::Timeout`] if the provider fails.
    /// - [`RagError::Validation`] on a dimension mismatch.
    pub async fn insert(&self, documents: &[Document]) -> Result<Vec<DocumentId>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let _insert_guard = self.insert_lock.lock().await;

        // 1. Embed the whole batch before touching the entries
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let deadline =
            batch_deadline(self.embed_timeout, texts.len(), self.embedder.max_concurrency());
        let embeddings = with_timeout("embedding", deadline, self.embedder.embed_batch(&texts))
            .await
            .inspect_err(|e| {
                error!(batch_size = documents.len(), error = %e, "embedding failed during insert");
            })?;

        if embeddings.len() != documents.len() {
            error!(
                expected = documents.len(),
                actual = embeddings.len(),
                "embedding count mismatch"
            );
            return Err(RagError::embedding(
                self.embedder.name(),
                format!(
                    "provider returned {} vectors for {} inputs",
                    embeddings.len(),
                    documents.len()
                ),
            ));
        }

        // 2. Validate dimensions, then append under one write guard
        let mut state = self.state.write().await;
        let dimensions = match state.dimensions {
            Some(dimensions) => dimensions,
            None => embeddings[0].len(),
        };
        if dimensions == 0 {
            return Err(RagError::Validation("embeddings must have at least one dimension".into()));
        }
        if let Some((position, embedding)) =
            embeddings.iter().enumerate().find(|(_, e)| e.len() != dimensions)
        {
            error!(position, expected = dimensions, actual = embedding.len(), "dimension mismatch");
            return Err(RagError::Validation(format!(
                "embedding for document {position} has dimension {}, index expects {dimensions}",
                embedding.len()
            )));
        }

        state.dimensions = Some(dimensions);
        let mut ids = Vec::with_capacity(documents.len());
        for (document, embedding) in documents.iter().zip(embeddings) {
            let id = DocumentId(state.next_id);
            state.next_id += 1;
            state.entries.push(IndexEntry { id, document: document.clone(), embedding });
            ids.push(id);
        }

        info!(inserted = ids.len(), total = state.entries.len(), dimensions, "inserted documents");
        Ok(ids)
    }

    /// Remove entries by id. Unknown ids are ignored.
    ///
    /// Returns the number of entries removed. Removed ids are never reused.
    pub async fn delete(&self, ids: &[DocumentId]) -> Result<usize> {
        let _insert_guard = self.insert_lock.lock().await;
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|entry| !ids.contains(&entry.id));
        let removed = before - state.entries.len();
        info!(removed, total = state.entries.len(), "deleted documents");
        Ok(removed)
    }

    /// Return the `k` stored documents most similar to `text`.
    ///
    /// Results are sorted by descending cosine similarity, ties broken by
    /// insertion order. An empty index yields an empty result without
    /// calling the embedder.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if `k == 0` (checked before any network call).
    /// - [`RagError::Embedding`] / [`RagError::Timeout`] if embedding the query fails.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SimilarityResult>> {
        validate_k(k)?;
        if self.is_empty().await {
            debug!(k, "query against empty index");
            return Ok(Vec::new());
        }

        let embedding = with_timeout("embedding", self.embed_timeout, self.embedder.embed(text))
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during query"))?;

        self.search(&embedding, k).await
    }

    /// Run several queries, returning one result list per request in input order.
    ///
    /// Equivalent to calling [`query`](VectorIndex::query) for each request;
    /// at most `max_concurrency` queries are in flight at once.
    pub async fn query_batch(
        &self,
        requests: &[RetrievalRequest],
    ) -> Result<Vec<Vec<SimilarityResult>>> {
        for request in requests {
            validate_k(request.k)?;
        }

        let calls: Vec<_> =
            requests.iter().map(|request| self.query(&request.query, request.k)).collect();
        stream::iter(calls).buffered(self.max_concurrency).try_collect().await
    }

    /// Score a precomputed embedding against every entry and return the top `k`.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if `k == 0` or the embedding dimension differs
    ///   from the index dimension.
    /// - [`RagError::IndexConsistency`] if a stored entry has the wrong dimension.
    pub async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        validate_k(k)?;
        let state = self.state.read().await;
        let Some(dimensions) = state.dimensions else {
            return Ok(Vec::new());
        };
        if embedding.len() != dimensions {
            return Err(RagError::Validation(format!(
                "query embedding has dimension {}, index expects {dimensions}",
                embedding.len()
            )));
        }

        let mut scored = Vec::with_capacity(state.entries.len());
        for (position, entry) in state.entries.iter().enumerate() {
            if entry.embedding.len() != dimensions {
                error!(
                    id = %entry.id,
                    expected = dimensions,
                    actual = entry.embedding.len(),
                    "corrupt index entry"
                );
                return Err(RagError::IndexConsistency(format!(
                    "entry {} has dimension {}, index expects {dimensions}",
                    entry.id,
                    entry.embedding.len()
                )));
            }
            scored.push((position, cosine_similarity(&entry.embedding, embedding)));
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let results: Vec<SimilarityResult> = scored
            .into_iter()
            .map(|(position, score)| {
                let entry = &state.entries[position];
                SimilarityResult { id: entry.id, document: entry.document.clone(), score }
            })
            .collect();

        debug!(k, result_count = results.len(), "search completed");
        Ok(results)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("embedder", &self.embedder.name())
            .field("embed_timeout", &self.embed_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

/// Deadline for embedding `count` texts, `per_call` for every round of
/// `max_concurrency` in-flight calls.
fn batch_deadline(per_call: Duration, count: usize, max_concurrency: usize) -> Duration {
    let rounds = count.div_ceil(max_concurrency.max(1)).max(1);
    per_call.saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
}

fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::Validation("k must be greater than zero".to_string()));
    }
    Ok(())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Builder for constructing a [`VectorIndex`].
///
/// # Example
///
/// ```rust,ignore
/// let index = VectorIndex::builder()
///     .embedder(Arc::new(embedder))
///     .dimensions(1536)
///     .embed_timeout(Duration::from_secs(10))
///     .max_concurrency(8)
///     .build()?;
/// ```
#[derive(Default)]
pub struct VectorIndexBuilder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    dimensions: Option<usize>,
    embed_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
}

impl VectorIndexBuilder {
    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Pin the vector dimension instead of taking it from the first batch.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the deadline for each embedding call.
    ///
    /// Inserts allow this much time per round of concurrent calls.
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = Some(timeout);
        self
    }

    /// Set the number of concurrent queries issued by `query_batch`.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Build the [`VectorIndex`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedder is missing, or if the
    /// dimension, timeout, or concurrency limit is zero.
    pub fn build(self) -> Result<VectorIndex> {
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        if self.dimensions == Some(0) {
            return Err(RagError::Config("dimensions must be greater than zero".to_string()));
        }
        let embed_timeout = self.embed_timeout.unwrap_or(DEFAULT_EMBED_TIMEOUT);
        if embed_timeout.is_zero() {
            return Err(RagError::Config("embed_timeout must be non-zero".to_string()));
        }
        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(RagError::Config("max_concurrency must be greater than zero".to_string()));
        }

        let state = IndexState { dimensions: self.dimensions, ..IndexState::default() };
        Ok(VectorIndex {
            embedder,
            state: RwLock::new(state),
            insert_lock: Mutex::new(()),
            embed_timeout,
            max_concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_deadline_scales_with_rounds() {
        let second = Duration::from_secs(1);
        assert_eq!(batch_deadline(second, 1, 4), second);
        assert_eq!(batch_deadline(second, 4, 4), second);
        assert_eq!(batch_deadline(second, 12, 4), Duration::from_secs(3));
        assert_eq!(batch_deadline(second, 5, 0), Duration::from_secs(5));
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let score = cosine_similarity(&[1.0, 1.0], &[10.0, 10.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn validate_k_rejects_zero() {
        assert!(matches!(validate_k(0), Err(RagError::Validation(_))));
        assert!(validate_k(1).is_ok());
    }
}
