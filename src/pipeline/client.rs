//! Remote transform client: one LLM call per item, wrapped in retry/backoff.
//!
//! The seam is the [`Transformer`] trait. [`LlmTransformer`] drives a real
//! `edgequake_llm` provider; tests plug in scripted implementations. Each raw
//! call returns a [`TransformError`] tagged with an [`ErrorClass`], and
//! [`transform_with_retry`] turns that into the retry decision.
//!
//! ## Retry Strategy
//!
//! Rate-limit and transient failures are retried with exponential backoff
//! (`base_delay * 2^attempt`). With the defaults (2 s base, 3 retries) the
//! waits are 2 s → 4 s → 8 s, after which the last error is surfaced.
//! Fatal failures are never retried.

use crate::config::BatchConfig;
use crate::error::{ErrorClass, TransformError, TransformFailure};
use crate::pipeline::source::WorkItem;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// A single remote text transform (OCR or translation).
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Perform one call for `item`, without retrying.
    async fn transform(&self, item: &WorkItem) -> Result<String, TransformError>;
}

/// Backoff schedule applied around a [`Transformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each following one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Successful transform plus the number of calls it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub text: String,
    pub attempts: u32,
}

/// Call `transformer` for `item`, retrying per `policy`.
pub async fn transform_with_retry(
    transformer: &dyn Transformer,
    item: &WorkItem,
    policy: &RetryPolicy,
) -> Result<Transformed, TransformFailure> {
    let mut attempt = 0u32;
    loop {
        match transformer.transform(item).await {
            Ok(text) => {
                return Ok(Transformed {
                    text,
                    attempts: attempt + 1,
                })
            }
            Err(e) if !e.class.is_retryable() => {
                warn!("{}: non-retryable error: {}", item.id, e.message);
                return Err(TransformFailure::Fatal {
                    attempt: attempt + 1,
                    message: e.message,
                });
            }
            Err(e) if attempt >= policy.max_retries => {
                warn!(
                    "{}: giving up after {} attempts: {}",
                    item.id,
                    attempt + 1,
                    e.message
                );
                return Err(TransformFailure::Exhausted {
                    attempts: attempt + 1,
                    class: e.class,
                    message: e.message,
                });
            }
            Err(e) => {
                let wait = policy.delay_for(attempt);
                match e.class {
                    ErrorClass::RateLimit => warn!(
                        "{}: rate limited, waiting {:?} before retry {}/{}",
                        item.id,
                        wait,
                        attempt + 1,
                        policy.max_retries
                    ),
                    _ => warn!(
                        "{}: {}, retrying in {:?} ({}/{})",
                        item.id,
                        e.message,
                        wait,
                        attempt + 1,
                        policy.max_retries
                    ),
                }
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// [`Transformer`] backed by an `edgequake_llm` provider.
///
/// ## Message Layout
///
/// 1. **System message**: the stage prompt (or the user override)
/// 2. **User message**: the stage instruction followed by the item text,
///    with the page image attached for OCR
pub struct LlmTransformer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    instruction: String,
    options: CompletionOptions,
    call_timeout: Duration,
}

impl LlmTransformer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(config.stage).to_string());
        Self {
            provider,
            system_prompt,
            instruction: prompts::instruction(config.stage).to_string(),
            options: build_options(config),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn messages(&self, item: &WorkItem) -> Vec<ChatMessage> {
        let user_text = if item.text.is_empty() {
            self.instruction.clone()
        } else {
            format!("{}\n\n{}", self.instruction, item.text)
        };
        let user = match &item.image {
            Some(img) => ChatMessage::user_with_images(&user_text, vec![img.clone()]),
            None => ChatMessage::user(&user_text),
        };
        vec![ChatMessage::system(&self.system_prompt), user]
    }
}

#[async_trait]
impl Transformer for LlmTransformer {
    async fn transform(&self, item: &WorkItem) -> Result<String, TransformError> {
        let messages = self.messages(item);
        let call = self.provider.chat(&messages, Some(&self.options));

        let response = match timeout(self.call_timeout, call).await {
            Err(_) => {
                return Err(TransformError::transient(format!(
                    "call timed out after {}s",
                    self.call_timeout.as_secs()
                )))
            }
            Ok(Err(e)) => return Err(classify_llm_error(&e)),
            Ok(Ok(response)) => response,
        };

        debug!(
            "{}: {} input tokens, {} output tokens",
            item.id, response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(TransformError::fatal("empty response from model"));
        }
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the batch config.
fn build_options(config: &BatchConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error onto the retry classes.
///
/// Rate limits wait and retry; network failures, timeouts and server-side
/// API errors are transient. Everything the request itself got wrong (auth,
/// bad parameters, unknown model, oversized input) is fatal.
pub fn classify_llm_error(err: &LlmError) -> TransformError {
    let class = match err {
        LlmError::RateLimited(_) => ErrorClass::RateLimit,
        LlmError::NetworkError(_) | LlmError::Timeout => ErrorClass::Transient,
        LlmError::ApiError(_) | LlmError::ProviderError(_)
            if err.retry_strategy().should_retry() =>
        {
            ErrorClass::Transient
        }
        _ => ErrorClass::Fatal,
    };
    TransformError {
        class,
        message: err.to_string(),
    }
}
