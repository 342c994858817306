//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use ragchain::mock::KeywordEmbeddingProvider;
use ragchain::{Document, EmbeddingProvider, RagError};

/// The five-document pets collection.
pub fn pet_documents() -> Vec<Document> {
    vec![
        Document::new("Dogs are wonderful partners, known for their loyalty and friendliness.")
            .with_source("mammal-pets-doc"),
        Document::new("Cats are independent pets that often enjoy having a space of their own.")
            .with_source("mammal-pets-doc"),
        Document::new("Goldfish are popular with beginners because they are relatively easy to keep.")
            .with_source("fish-pets-doc"),
        Document::new("Parrots are clever birds that can mimic human speech.")
            .with_source("bird-pets-doc"),
        Document::new("Rabbits are social animals and need plenty of room to hop around.")
            .with_source("mammal-pets-doc"),
    ]
}

/// Keyword embedder with one dimension per animal in [`pet_documents`].
pub fn pet_embedder() -> KeywordEmbeddingProvider {
    KeywordEmbeddingProvider::new([
        vec!["dog"],
        vec!["cat"],
        vec!["fish", "goldfish"],
        vec!["parrot", "bird"],
        vec!["rabbit"],
    ])
}

/// Embedder returning fixed vectors from a lookup table.
///
/// Unknown texts fail with [`RagError::Embedding`].
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl TableEmbedder {
    pub fn new(dimensions: usize, entries: impl IntoIterator<Item = (String, Vec<f32>)>) -> Self {
        Self { table: entries.into_iter().collect(), dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> ragchain::Result<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| RagError::embedding("table", format!("no vector for '{text}'")))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
