//! Configuration for the RAG chain and its model clients.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::DEFAULT_GENERATION_TIMEOUT;
use crate::embedding::DEFAULT_MAX_CONCURRENCY;
use crate::error::{RagError, Result};
use crate::generation::GenerationParams;
use crate::index::DEFAULT_EMBED_TIMEOUT;
use crate::prompt::PromptTemplate;

/// The default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default chat model.
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-3.5-turbo";

/// Configuration parameters for the RAG chain.
///
/// The API key is never serialized and is redacted in `Debug` output.
/// Deserialization goes through [`RagConfigBuilder::build`], so a
/// deserialized config is always valid; missing fields take their defaults.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RagConfigFields")]
pub struct RagConfig {
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Generative model identifier.
    pub generation_model: String,
    /// API credential for both model services.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Sampling temperature. `None` uses the model default.
    pub temperature: Option<f32>,
    /// Maximum output tokens. `None` uses the model default.
    pub max_tokens: Option<u32>,
    /// Number of documents retrieved per question.
    pub top_k: usize,
    /// Prompt template with `{context}` and `{question}` placeholders.
    pub template: PromptTemplate,
    /// Deadline for each embedding call.
    pub embed_timeout: Duration,
    /// Deadline for each generation call.
    pub generation_timeout: Duration,
    /// Upper bound on concurrent outbound calls in batch operations.
    pub max_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_tokens: None,
            top_k: 1,
            template: PromptTemplate::default(),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagConfig")
            .field("embedding_model", &self.embedding_model)
            .field("generation_model", &self.generation_model)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_k", &self.top_k)
            .field("template", &self.template.as_str())
            .field("embed_timeout", &self.embed_timeout)
            .field("generation_timeout", &self.generation_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a validated config from process environment variables.
    ///
    /// Reads `OPENAI_API_KEY` and the `RAGCHAIN_*` variables; unset variables
    /// keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable cannot be parsed or the
    /// resulting config is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a validated config from an arbitrary key lookup.
    ///
    /// [`from_env`](RagConfig::from_env) is this with `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(key) = lookup("OPENAI_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(model) = lookup("RAGCHAIN_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        if let Some(model) = lookup("RAGCHAIN_GENERATION_MODEL") {
            builder = builder.generation_model(model);
        }
        if let Some(url) = lookup("RAGCHAIN_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(value) = lookup("RAGCHAIN_TEMPERATURE") {
            builder = builder.temperature(parse_var("RAGCHAIN_TEMPERATURE", &value)?);
        }
        if let Some(value) = lookup("RAGCHAIN_MAX_TOKENS") {
            builder = builder.max_tokens(parse_var("RAGCHAIN_MAX_TOKENS", &value)?);
        }
        if let Some(value) = lookup("RAGCHAIN_TOP_K") {
            builder = builder.top_k(parse_var("RAGCHAIN_TOP_K", &value)?);
        }
        if let Some(template) = lookup("RAGCHAIN_TEMPLATE") {
            builder = builder.template(template);
        }
        if let Some(value) = lookup("RAGCHAIN_TIMEOUT_SECS") {
            let timeout = Duration::from_secs(parse_var("RAGCHAIN_TIMEOUT_SECS", &value)?);
            builder = builder.embed_timeout(timeout).generation_timeout(timeout);
        }
        if let Some(value) = lookup("RAGCHAIN_MAX_CONCURRENCY") {
            builder = builder.max_concurrency(parse_var("RAGCHAIN_MAX_CONCURRENCY", &value)?);
        }
        builder.build()
    }

    /// The pass-through sampling parameters.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams { temperature: self.temperature, max_tokens: self.max_tokens }
    }
}

/// Deserialized form of [`RagConfig`], validated on conversion.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RagConfigFields {
    embedding_model: Option<String>,
    generation_model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_k: Option<usize>,
    template: Option<String>,
    embed_timeout: Option<Duration>,
    generation_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
}

impl TryFrom<RagConfigFields> for RagConfig {
    type Error = RagError;

    fn try_from(fields: RagConfigFields) -> Result<Self> {
        let mut builder = RagConfig::builder();
        if let Some(model) = fields.embedding_model {
            builder = builder.embedding_model(model);
        }
        if let Some(model) = fields.generation_model {
            builder = builder.generation_model(model);
        }
        if let Some(key) = fields.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = fields.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temperature) = fields.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = fields.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(k) = fields.top_k {
            builder = builder.top_k(k);
        }
        if let Some(template) = fields.template {
            builder = builder.template(template);
        }
        if let Some(timeout) = fields.embed_timeout {
            builder = builder.embed_timeout(timeout);
        }
        if let Some(timeout) = fields.generation_timeout {
            builder = builder.generation_timeout(timeout);
        }
        if let Some(limit) = fields.max_concurrency {
            builder = builder.max_concurrency(limit);
        }
        builder.build()
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Config(format!("{name}: cannot parse '{value}': {e}")))
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
    template: Option<String>,
}

impl RagConfigBuilder {
    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the generative model identifier.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Set the API credential.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of output tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    /// Set the number of documents retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the prompt template text. Validated in [`build`](RagConfigBuilder::build).
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set the deadline for each embedding call.
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout = timeout;
        self
    }

    /// Set the deadline for each generation call.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    /// Set the concurrency bound for batch operations.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `top_k == 0` or `max_concurrency == 0`
    /// - `max_tokens == Some(0)`
    /// - `temperature` is not a finite value in `0.0..=2.0`
    /// - a timeout is zero
    /// - the template lacks `{context}` or `{question}`
    /// - a model identifier or the base URL is empty
    pub fn build(self) -> Result<RagConfig> {
        let mut config = self.config;
        if let Some(template) = self.template {
            config.template = PromptTemplate::new(template)?;
        }

        if config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if config.max_concurrency == 0 {
            return Err(RagError::Config("max_concurrency must be greater than zero".to_string()));
        }
        if config.max_tokens == Some(0) {
            return Err(RagError::Config("max_tokens must be greater than zero".to_string()));
        }
        if let Some(temperature) = config.temperature {
            if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
                return Err(RagError::Config(format!(
                    "temperature ({temperature}) must be between 0.0 and 2.0"
                )));
            }
        }
        if config.embed_timeout.is_zero() || config.generation_timeout.is_zero() {
            return Err(RagError::Config("timeouts must be non-zero".to_string()));
        }
        if config.embedding_model.trim().is_empty() || config.generation_model.trim().is_empty() {
            return Err(RagError::Config("model identifiers must not be empty".to_string()));
        }
        if config.base_url.trim().is_empty() {
            return Err(RagError::Config("base_url must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.top_k, 1);
        assert_eq!(config.temperature, None);
        assert_eq!(config.max_tokens, None);
        assert_eq!(config.generation_params(), GenerationParams::default());
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = RagConfig::builder().top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("top_k")));
    }

    #[test]
    fn rejects_zero_max_tokens() {
        assert!(RagConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(RagConfig::builder().temperature(f32::NAN).build().is_err());
        assert!(RagConfig::builder().temperature(-0.1).build().is_err());
        assert!(RagConfig::builder().temperature(0.1).build().is_ok());
    }

    #[test]
    fn rejects_template_missing_placeholder() {
        let err = RagConfig::builder().template("Context: {context}").build().unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("{question}")));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(RagConfig::builder().generation_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn reads_variables_from_lookup() {
        let config = RagConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RAGCHAIN_GENERATION_MODEL", "gpt-4o-mini"),
            ("RAGCHAIN_TEMPERATURE", "0.1"),
            ("RAGCHAIN_MAX_TOKENS", "100"),
            ("RAGCHAIN_TOP_K", " 3 "),
            ("RAGCHAIN_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.generation_model, "gpt-4o-mini");
        assert_eq!(config.temperature, Some(0.1));
        assert_eq!(config.max_tokens, Some(100));
        assert_eq!(config.top_k, 3);
        assert_eq!(config.generation_timeout, Duration::from_secs(5));
        assert_eq!(config.embed_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_variable_is_config_error() {
        let err = RagConfig::from_lookup(lookup(&[("RAGCHAIN_TOP_K", "many")])).unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("RAGCHAIN_TOP_K")));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = RagConfig::builder().api_key("sk-secret").build().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn deserialization_applies_defaults_and_validates() {
        let config: RagConfig =
            serde_json::from_str(r#"{ "top_k": 3, "temperature": 0.1 }"#).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.temperature, Some(0.1));
        assert_eq!(config.generation_model, DEFAULT_GENERATION_MODEL);
        assert_eq!(config.embed_timeout, DEFAULT_EMBED_TIMEOUT);

        for invalid in [
            r#"{ "top_k": 0 }"#,
            r#"{ "max_tokens": 0 }"#,
            r#"{ "max_concurrency": 0 }"#,
            r#"{ "embed_timeout": { "secs": 0, "nanos": 0 } }"#,
            r#"{ "template": "no placeholders" }"#,
        ] {
            let err = serde_json::from_str::<RagConfig>(invalid).unwrap_err();
            assert!(err.is_data(), "{invalid}: {err}");
        }
    }

    #[test]
    fn serialized_config_deserializes_back() {
        let config = RagConfig::builder().top_k(2).max_tokens(100).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let restored: RagConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn api_key_is_not_serialized() {
        let config = RagConfig::builder().api_key("sk-secret").build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
