//! Data types for documents, index entries, and search results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key naming where a document came from.
pub const SOURCE_KEY: &str = "source";

/// A document containing text content and metadata.
///
/// Documents are immutable once inserted into a
/// [`VectorIndex`](crate::VectorIndex). Changing content means deleting the
/// old entry and inserting a new one, so a stored vector always matches its
/// document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Document {
    /// The text content of the document.
    pub content: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with the given content and no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: HashMap::new() }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Shorthand for `with_metadata("source", source)`.
    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.with_metadata(SOURCE_KEY, source)
    }

    /// The `source` metadata value, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// Identifier assigned to a document when it is inserted into an index.
///
/// Identifiers are handed out in insertion order and never reused, so
/// comparing two ids also compares their insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// A stored [`Document`] together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Identifier assigned at insertion.
    pub id: DocumentId,
    /// The stored document.
    pub document: Document,
    /// The vector embedding of the document's content.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Document`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityResult {
    /// Identifier of the matched entry.
    pub id: DocumentId,
    /// The matched document.
    pub document: Document,
    /// Cosine similarity to the query (higher is more similar).
    pub score: f32,
}

/// A query string plus the number of results wanted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// The query text.
    pub query: String,
    /// Maximum number of results. Must be at least 1.
    pub k: usize,
}

impl RetrievalRequest {
    /// Create a new request.
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self { query: query.into(), k }
    }
}
