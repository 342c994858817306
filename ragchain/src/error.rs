//! Error types for the `ragchain` crate.

use std::time::Duration;

use thiserror::Error;

use crate::chain::ChainStage;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid input rejected before any network call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the generative model call.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An outbound call did not complete within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out (`embedding` or `generation`).
        operation: &'static str,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// The index holds entries that violate its own invariants.
    #[error("Index consistency error: {0}")]
    IndexConsistency(String),
}

impl RagError {
    /// Shorthand for an [`RagError::Embedding`] error.
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for an [`RagError::Generation`] error.
    pub fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation { provider: provider.into(), message: message.into() }
    }

    /// Whether this error is a [`RagError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A failed [`GenerationChain::answer`](crate::GenerationChain::answer) call.
///
/// Carries the stage that was active when the failure happened and the
/// underlying error, unmodified.
#[derive(Debug, Error)]
#[error("chain failed while {stage}: {source}")]
pub struct ChainError {
    /// The stage that produced the error.
    pub stage: ChainStage,
    /// The underlying cause.
    #[source]
    pub source: RagError,
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
