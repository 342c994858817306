//! # ragchain
//!
//! Retrieval-augmented generation: answer a question by retrieving the most
//! similar documents from a vector index and handing them to a generative
//! model as grounding context.
//!
//! ## Overview
//!
//! - [`EmbeddingProvider`] - text to fixed-dimension vectors (external model)
//! - [`VectorIndex`] - exact top-k cosine similarity over embedded documents
//! - [`Retriever`] - fixed-`k` retrieval, single and batch
//! - [`assemble`] / [`PromptTemplate`] - renders `{context}` and `{question}`
//! - [`GeneratorClient`] - external generative model
//! - [`GenerationChain`] - retrieve → assemble → generate, with typed stage errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchain::{Document, GenerationChain, Retriever, VectorIndex};
//! use ragchain::mock::{MockEmbeddingProvider, MockGenerator};
//!
//! let index = Arc::new(VectorIndex::new(Arc::new(MockEmbeddingProvider::new(64))));
//! let cats = Document::new("Cats are independent pets.").with_source("mammal-pets-doc");
//! index.insert(&[cats]).await?;
//!
//! let chain = GenerationChain::builder()
//!     .retriever(Retriever::new(index, 1)?)
//!     .generator(Arc::new(MockGenerator::new("Cats like their own space.")))
//!     .build()?;
//!
//! let answer = chain.answer("Tell me about cats").await?;
//! ```
//!
//! ## Features
//!
//! - `openai` - [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatClient`]

pub mod chain;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod prompt;
pub mod retriever;
mod timeout;

pub use chain::{
    ChainObserver, ChainStage, GeneratedAnswer, GenerationChain, GenerationChainBuilder,
};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Document, DocumentId, IndexEntry, RetrievalRequest, SimilarityResult};
pub use embedding::EmbeddingProvider;
pub use error::{ChainError, RagError, Result};
pub use generation::{GenerationParams, GenerationRequest, GeneratorClient};
pub use index::{VectorIndex, VectorIndexBuilder, cosine_similarity};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatClient, OpenAIEmbeddingProvider};
pub use prompt::{Prompt, PromptTemplate, assemble};
pub use retriever::Retriever;
