//! Prompt templates and context assembly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{RagError, Result};

/// Placeholder replaced by the joined context documents.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Placeholder replaced by the user's question.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Separator placed between document contents in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Grounding instruction used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = "Answer the question using only the following context.

Context:
{context}

Question:
{question}
";

/// A validated prompt template containing both placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Create a template, checking that `{context}` and `{question}` are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if either placeholder is missing.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !text.contains(placeholder) {
                return Err(RagError::Config(format!(
                    "prompt template must contain the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { text })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitute both placeholders in a single left-to-right pass.
    ///
    /// Placeholder-like text inside `context` or `question` is copied
    /// verbatim, never expanded again.
    pub fn render(&self, context: &str, question: &str) -> Prompt {
        let mut rendered = String::with_capacity(self.text.len() + context.len() + question.len());
        let mut rest = self.text.as_str();
        while let Some(position) = rest.find('{') {
            rendered.push_str(&rest[..position]);
            let tail = &rest[position..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
        rendered.push_str(rest);
        Prompt(rendered)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { text: DEFAULT_TEMPLATE.to_string() }
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = RagError;

    fn try_from(text: String) -> Result<Self> {
        Self::new(text)
    }
}

impl From<PromptTemplate> for String {
    fn from(template: PromptTemplate) -> Self {
        template.text
    }
}

/// A fully rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt(String);

impl Prompt {
    /// The rendered text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the prompt, returning the rendered text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Join document contents into a context block, one paragraph per document.
pub fn context_block(documents: &[Document]) -> String {
    documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Render `template` with the ranked `documents` as context and `question`.
///
/// Pure: identical inputs always produce an identical prompt.
pub fn assemble(template: &PromptTemplate, documents: &[Document], question: &str) -> Prompt {
    template.render(&context_block(documents), question)
}
