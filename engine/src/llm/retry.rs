//! Uniform retry and timeout around every generation call
//!
//! Experts, conductors, the reducer, fixture generation and the baselines all
//! call the model through a [`TextGenerator`]. Each attempt runs under its own
//! timeout; failed attempts back off exponentially; once the budget is spent
//! the last failure is reported as `EngineError::Generation`.

use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;

use super::{LLMError, LLMProvider, Message};

/// Attempt budget and timing for generation calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(120))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            timeout,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// A provider paired with the retry policy every call site shares
#[derive(Clone)]
pub struct TextGenerator {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
}

impl TextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Generate from a role/system context and a prompt
    pub async fn generate(&self, system: &str, prompt: &str) -> Result<String, EngineError> {
        let messages = [Message::system(system), Message::user(prompt)];
        self.generate_messages(&messages).await
    }

    /// Generate from an arbitrary conversation
    pub async fn generate_messages(&self, messages: &[Message]) -> Result<String, EngineError> {
        let mut last_error = LLMError::Timeout;

        for attempt in 1..=self.policy.max_attempts {
            let result =
                tokio::time::timeout(self.policy.timeout, self.provider.generate(messages)).await;

            let error = match result {
                Ok(Ok(text)) => {
                    if attempt > 1 {
                        tracing::info!(
                            "{} succeeded on attempt {}/{}",
                            self.provider.name(),
                            attempt,
                            self.policy.max_attempts
                        );
                    }
                    return Ok(text);
                }
                Ok(Err(e)) => e,
                Err(_) => LLMError::Timeout,
            };

            if !error.is_retryable() {
                tracing::error!("{} call failed permanently: {}", self.provider.name(), error);
                return Err(EngineError::generation(error.cause(), error.to_string()));
            }

            if attempt < self.policy.max_attempts {
                let backoff = self.policy.backoff(attempt);
                tracing::warn!(
                    "{} call failed (attempt {}/{}), retrying in {:?}: {}",
                    self.provider.name(),
                    attempt,
                    self.policy.max_attempts,
                    backoff,
                    error
                );
                tokio::time::sleep(backoff).await;
            }
            last_error = error;
        }

        tracing::error!(
            "{} call exhausted {} attempts: {}",
            self.provider.name(),
            self.policy.max_attempts,
            last_error
        );
        Err(EngineError::generation(
            last_error.cause(),
            format!(
                "{} after {} attempts",
                last_error, self.policy.max_attempts
            ),
        ))
    }
}
