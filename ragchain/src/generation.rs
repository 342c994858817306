//! Generative model boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prompt::Prompt;

/// Sampling parameters passed through to the model.
///
/// Unset values are left to the model's own defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A single generation call: the assembled prompt plus parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The rendered prompt.
    pub prompt: Prompt,
    /// Sampling parameters.
    pub params: GenerationParams,
}

/// A client for a generative text model.
///
/// Implementations map every service failure to
/// [`RagError::Generation`](crate::RagError::Generation). Retries, if any,
/// belong to the implementation, never to the chain.
#[async_trait]
pub trait GeneratorClient: Send + Sync {
    /// Generate a text response for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;

    /// Model or backend name used in logs and errors.
    fn name(&self) -> &str;
}
