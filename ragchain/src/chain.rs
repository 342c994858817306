//! Retrieval-to-generation chain.
//!
//! The [`GenerationChain`] answers a question in a fixed sequence of typed
//! stages: retrieve context with a [`Retriever`], render it with a
//! [`PromptTemplate`], then call a [`GeneratorClient`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchain::{GenerationChain, Retriever, VectorIndex};
//!
//! let retriever = Retriever::new(Arc::new(index), 1)?;
//! let chain = GenerationChain::builder()
//!     .retriever(retriever)
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let answer = chain.answer("Tell me about cats").await?;
//! println!("{}", answer.text);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RagConfig;
use crate::document::Document;
use crate::embedding::DEFAULT_MAX_CONCURRENCY;
use crate::error::{ChainError, RagError, Result};
use crate::generation::{GenerationParams, GenerationRequest, GeneratorClient};
use crate::prompt::{Prompt, PromptTemplate, assemble};
use crate::retriever::Retriever;
use crate::timeout::with_timeout;

/// Default deadline for a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// The stages a single [`GenerationChain::answer`] call moves through.
///
/// `Idle → Retrieving → Assembling → Generating → Done`, with `Failed`
/// reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStage {
    /// Not started.
    Idle,
    /// Embedding the question and querying the index.
    Retrieving,
    /// Rendering the prompt.
    Assembling,
    /// Waiting on the generative model.
    Generating,
    /// Answer produced.
    Done,
    /// A stage failed; see [`ChainError`].
    Failed,
}

impl ChainStage {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Instrumentation hook for chain runs.
///
/// Both methods default to no-ops.
pub trait ChainObserver: Send + Sync {
    /// Called on every stage transition.
    fn on_transition(&self, _from: ChainStage, _to: ChainStage) {}

    /// Called with the assembled prompt before it is sent to the generator.
    fn on_prompt(&self, _prompt: &Prompt) {}
}

/// The result of a successful [`GenerationChain::answer`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    /// The generated text.
    pub text: String,
    /// The documents used as context, in rank order.
    pub context: Vec<Document>,
    /// The prompt sent to the generator.
    pub prompt: Prompt,
    /// `true` when retrieval found nothing and the model answered ungrounded.
    pub empty_context: bool,
}

struct StageTracker<'a> {
    stage: ChainStage,
    observer: Option<&'a dyn ChainObserver>,
}

impl<'a> StageTracker<'a> {
    fn new(observer: Option<&'a dyn ChainObserver>) -> Self {
        Self { stage: ChainStage::Idle, observer }
    }

    fn advance(&mut self, next: ChainStage) {
        debug!(from = %self.stage, to = %next, "chain transition");
        if let Some(observer) = self.observer {
            observer.on_transition(self.stage, next);
        }
        self.stage = next;
    }

    fn fail(&mut self, source: RagError) -> ChainError {
        let stage = self.stage;
        error!(%stage, error = %source, "chain failed");
        self.advance(ChainStage::Failed);
        ChainError { stage, source }
    }
}

/// Orchestrates retrieval, prompt assembly, and generation.
///
/// Construct one via [`GenerationChain::builder()`]. The chain never retries
/// and never substitutes a default answer: a failure surfaces as a
/// [`ChainError`] naming the stage that failed.
pub struct GenerationChain {
    retriever: Retriever,
    generator: Arc<dyn GeneratorClient>,
    template: PromptTemplate,
    params: GenerationParams,
    generation_timeout: Duration,
    max_concurrency: usize,
    observer: Option<Arc<dyn ChainObserver>>,
}

impl GenerationChain {
    /// Create a new [`GenerationChainBuilder`].
    pub fn builder() -> GenerationChainBuilder {
        GenerationChainBuilder::default()
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return a reference to the prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Return the generation parameters.
    pub fn params(&self) -> GenerationParams {
        self.params
    }

    /// Answer a question: retrieve → assemble → generate.
    ///
    /// When retrieval finds no documents the chain still generates, with an
    /// empty context block, and sets [`GeneratedAnswer::empty_context`].
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] whose `stage` is the stage that failed and
    /// whose `source` is the unmodified underlying error.
    pub async fn answer(&self, question: &str) -> std::result::Result<GeneratedAnswer, ChainError> {
        let mut tracker = StageTracker::new(self.observer.as_deref());

        // 1. Retrieve ranked context
        tracker.advance(ChainStage::Retrieving);
        let context = self.retriever.retrieve(question).await.map_err(|e| tracker.fail(e))?;
        let empty_context = context.is_empty();
        if empty_context {
            warn!(question, "no context retrieved; generating without grounding");
        }

        // 2. Assemble the prompt
        tracker.advance(ChainStage::Assembling);
        let prompt = assemble(&self.template, &context, question);
        if let Some(observer) = &self.observer {
            observer.on_prompt(&prompt);
        }

        // 3. Generate
        tracker.advance(ChainStage::Generating);
        let request = GenerationRequest { prompt: prompt.clone(), params: self.params };
        let text = with_timeout(
            "generation",
            self.generation_timeout,
            self.generator.generate(request),
        )
        .await
        .map_err(|e| tracker.fail(e))?;

        tracker.advance(ChainStage::Done);
        info!(
            generator = self.generator.name(),
            context_count = context.len(),
            empty_context,
            answer_len = text.len(),
            "answer generated"
        );

        Ok(GeneratedAnswer { text, context, prompt, empty_context })
    }

    /// Answer several questions, returning one outcome per question in input order.
    ///
    /// A failure for one question does not affect the others.
    pub async fn answer_batch(
        &self,
        questions: &[&str],
    ) -> Vec<std::result::Result<GeneratedAnswer, ChainError>> {
        let calls: Vec<_> = questions.iter().map(|question| self.answer(question)).collect();
        stream::iter(calls).buffered(self.max_concurrency).collect().await
    }
}

/// Builder for constructing a [`GenerationChain`].
///
/// `retriever` and `generator` are required; everything else has defaults.
///
/// # Example
///
/// ```rust,ignore
/// let chain = GenerationChain::builder()
///     .config(&config)              // template, params, timeout, concurrency
///     .retriever(retriever)
///     .generator(Arc::new(generator))
///     .observer(Arc::new(observer)) // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct GenerationChainBuilder {
    retriever: Option<Retriever>,
    generator: Option<Arc<dyn GeneratorClient>>,
    template: Option<PromptTemplate>,
    params: GenerationParams,
    generation_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    observer: Option<Arc<dyn ChainObserver>>,
}

impl GenerationChainBuilder {
    /// Take template, generation parameters, timeout, and concurrency from a [`RagConfig`].
    pub fn config(mut self, config: &RagConfig) -> Self {
        self.template = Some(config.template.clone());
        self.params = config.generation_params();
        self.generation_timeout = Some(config.generation_timeout);
        self.max_concurrency = Some(config.max_concurrency);
        self
    }

    /// Set the retriever.
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the generator client.
    pub fn generator(mut self, generator: Arc<dyn GeneratorClient>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Set the generation parameters.
    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Set the deadline for the generation call.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    /// Set the number of concurrent answers issued by `answer_batch`.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Attach an instrumentation observer.
    pub fn observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the [`GenerationChain`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing, or if the
    /// timeout or concurrency limit is zero.
    pub fn build(self) -> Result<GenerationChain> {
        let retriever =
            self.retriever.ok_or_else(|| RagError::Config("retriever is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        let generation_timeout = self.generation_timeout.unwrap_or(DEFAULT_GENERATION_TIMEOUT);
        if generation_timeout.is_zero() {
            return Err(RagError::Config("generation_timeout must be non-zero".to_string()));
        }
        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(RagError::Config("max_concurrency must be greater than zero".to_string()));
        }

        Ok(GenerationChain {
            retriever,
            generator,
            template: self.template.unwrap_or_default(),
            params: self.params,
            generation_timeout,
            max_concurrency,
            observer: self.observer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages() {
        assert!(ChainStage::Done.is_terminal());
        assert!(ChainStage::Failed.is_terminal());
        assert!(!ChainStage::Generating.is_terminal());
        assert!(!ChainStage::Idle.is_terminal());
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(ChainStage::Retrieving.to_string(), "retrieving");
        assert_eq!(ChainStage::Generating.to_string(), "generating");
    }

    #[test]
    fn build_requires_retriever() {
        let err = GenerationChain::builder().build().err().unwrap();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("retriever")));
    }
}
