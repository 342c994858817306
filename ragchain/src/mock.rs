//! Deterministic in-process providers for demos and tests.
//!
//! None of these make network calls. [`MockEmbeddingProvider`] hashes text
//! into a direction, [`KeywordEmbeddingProvider`] counts keyword groups so
//! related texts actually land close together, and [`MockGenerator`] returns
//! a scripted reply while recording every request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::{ChainObserver, ChainStage};
use crate::embedding::{DEFAULT_MAX_CONCURRENCY, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{GenerationRequest, GeneratorClient};
use crate::prompt::Prompt;

/// Deterministic hash-based embeddings.
///
/// Equal texts get equal vectors; different texts get unrelated directions.
/// Vectors are L2-normalised.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    fail_on: Option<String>,
    latency: Option<Duration>,
    max_concurrency: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_on: None,
            latency: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail with [`RagError::Embedding`] whenever `text` is embedded.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on = Some(text.into());
        self
    }

    /// Sleep before every embedding.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Bound reported through [`EmbeddingProvider::max_concurrency`].
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Number of `embed` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `embed` calls that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            return Err(RagError::embedding("mock", format!("refusing to embed '{text}'")));
        }

        // FNV-1a seed, then one mixed value per dimension mapped into [-1, 1)
        let seed = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let bits = splitmix64(seed.wrapping_add(i as u64)) >> 40;
                bits as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
            })
            .collect();
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Bag-of-keywords embeddings.
///
/// Each dimension is a group of keywords; a text's value in that dimension
/// is the number of its words starting with any keyword of the group.
/// Matching is case-insensitive, so `"Cats"` counts toward `"cat"`.
#[derive(Debug, Clone)]
pub struct KeywordEmbeddingProvider {
    groups: Vec<Vec<String>>,
}

impl KeywordEmbeddingProvider {
    /// Create a provider with one dimension per keyword group.
    pub fn new<G, K>(groups: G) -> Self
    where
        G: IntoIterator<Item = K>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        let groups = groups
            .into_iter()
            .map(|group| group.into_iter().map(|k| k.into().to_lowercase()).collect())
            .collect();
        Self { groups }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> =
            lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        Ok(self
            .groups
            .iter()
            .map(|group| {
                words.iter().filter(|w| group.iter().any(|k| w.starts_with(k.as_str()))).count()
                    as f32
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.groups.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// A scripted [`GeneratorClient`].
///
/// Returns a fixed reply (optionally after a delay, or fails) and records
/// every request it receives.
#[derive(Debug)]
pub struct MockGenerator {
    reply: String,
    latency: Option<Duration>,
    failure: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Create a generator that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), latency: None, failure: None, requests: Mutex::new(Vec::new()) }
    }

    /// Sleep before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call with [`RagError::Generation`].
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl GeneratorClient for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match &self.failure {
            Some(message) => Err(RagError::generation("mock", message.clone())),
            None => Ok(self.reply.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A [`ChainObserver`] that records prompts and stage transitions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    prompts: Mutex<Vec<Prompt>>,
    transitions: Mutex<Vec<(ChainStage, ChainStage)>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompts seen so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Transitions seen so far, as `(from, to)` pairs.
    pub fn transitions(&self) -> Vec<(ChainStage, ChainStage)> {
        self.transitions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ChainObserver for RecordingObserver {
    fn on_transition(&self, from: ChainStage, to: ChainStage) {
        self.transitions.lock().unwrap_or_else(PoisonError::into_inner).push((from, to));
    }

    fn on_prompt(&self, prompt: &Prompt) {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(prompt.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_normalized() {
        let provider = MockEmbeddingProvider::new(16);
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("hello").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn different_texts_point_in_different_directions() {
        let provider = MockEmbeddingProvider::new(32);
        let a = provider.embed("cat").await.unwrap();
        let b = provider.embed("dog").await.unwrap();
        assert!(crate::index::cosine_similarity(&a, &b) < 0.9);
    }

    #[tokio::test]
    async fn empty_text_still_embeds() {
        let provider = MockEmbeddingProvider::new(4);
        assert_eq!(provider.embed("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn keyword_embeddings_count_prefix_matches() {
        let provider = KeywordEmbeddingProvider::new([vec!["cat"], vec!["fish", "goldfish"]]);
        let v = provider.embed("Cats and cat-like FISH").await.unwrap();
        assert_eq!(v, vec![2.0, 1.0]);
    }

    #[tokio::test]
    async fn default_embed_batch_preserves_order() {
        let provider = MockEmbeddingProvider::new(8);
        let batch = provider.embed_batch(&["a", "b", "c"]).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], provider.embed("b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn default_embed_batch_respects_concurrency_limit() {
        let provider = MockEmbeddingProvider::new(8)
            .with_latency(Duration::from_millis(100))
            .with_max_concurrency(3);
        let texts: Vec<String> = (0..10).map(|i| format!("text-{i}")).collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();

        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 10);
        assert_eq!(batch[7], provider.embed("text-7").await.unwrap());
        assert_eq!(provider.peak_concurrency(), 3);
    }

    #[tokio::test]
    async fn generator_records_requests() {
        let generator = MockGenerator::new("ok");
        let request = GenerationRequest {
            prompt: crate::prompt::PromptTemplate::default().render("c", "q"),
            params: Default::default(),
        };
        assert_eq!(generator.generate(request.clone()).await.unwrap(), "ok");
        assert_eq!(generator.requests(), vec![request]);
    }
}
