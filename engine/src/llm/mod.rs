//! Text-generation provider abstraction
//!
//! Every call the orchestration loop makes to a model goes through the
//! [`LLMProvider`] trait. Providers return plain text; turning that text into
//! comments, artifacts or decisions is the caller's job. Retry and timeout are
//! layered on top by [`retry::TextGenerator`] so that every call site gets the
//! same policy.

use async_trait::async_trait;
use sdk::errors::GenerationCause;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod openai;
pub mod retry;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use retry::{RetryPolicy, TextGenerator};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during a single provider call
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LLMError::AuthenticationFailed(_) | LLMError::InvalidRequest(_)
        )
    }

    /// Classification reported when the call finally fails.
    ///
    /// Auth, invalid-request, network and parse failures have no dedicated
    /// cause and report `ServerError`.
    pub fn cause(&self) -> GenerationCause {
        match self {
            LLMError::Timeout => GenerationCause::Timeout,
            LLMError::RateLimitExceeded => GenerationCause::RateLimit,
            _ => GenerationCause::ServerError,
        }
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Provider trait that all text-generation backends implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Model identifier requests are sent to
    fn model(&self) -> &str;

    /// Returns true for providers running on this machine
    fn is_local(&self) -> bool {
        false
    }

    /// Generate a completion for the conversation
    ///
    /// # Returns
    /// * `Ok(String)` - The generated text
    /// * `Err(LLMError)` - If this single attempt failed
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently reachable and configured
    async fn check_health(&self) -> bool {
        true
    }
}
