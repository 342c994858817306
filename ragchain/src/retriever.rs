//! Fixed-`k` document retrieval over a [`VectorIndex`].

use std::sync::Arc;

use tracing::debug;

use crate::document::{Document, RetrievalRequest};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Retrieves the `k` most relevant documents for a question.
///
/// Scores are stripped; documents come back in rank order. An empty index
/// yields empty results rather than an error.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    k: usize,
}

impl Retriever {
    /// Create a retriever returning at most `k` documents per question.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if `k == 0`.
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RagError::Validation("k must be greater than zero".to_string()));
        }
        Ok(Self { index, k })
    }

    /// The number of documents requested per question.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The underlying index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Retrieve ranked documents for one question.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Document>> {
        let results = self.index.query(question, self.k).await?;
        debug!(k = self.k, result_count = results.len(), "retrieved documents");
        Ok(results.into_iter().map(|r| r.document).collect())
    }

    /// Retrieve ranked documents for several questions, in input order.
    pub async fn retrieve_batch(&self, questions: &[&str]) -> Result<Vec<Vec<Document>>> {
        let requests: Vec<RetrievalRequest> =
            questions.iter().map(|q| RetrievalRequest::new(*q, self.k)).collect();
        let results = self.index.query_batch(&requests).await?;
        Ok(results
            .into_iter()
            .map(|ranked| ranked.into_iter().map(|r| r.document).collect())
            .collect())
    }
}
