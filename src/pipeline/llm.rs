//! LLM interaction: turn one document's text into a structured [`Document`].
//!
//! [`DocumentStructurer`] is the seam the orchestration layer talks to;
//! [`LlmStructurer`] is the real implementation over an `edgequake-llm`
//! provider. All prompt text lives in [`crate::prompts`] and all output
//! repair in [`crate::pipeline::postprocess`], so this module only owns the
//! request shape and the retry loop.
//!
//! ## Retry Strategy
//!
//! Only failed provider calls are retried, with exponential backoff
//! (`retry_backoff_ms * 2^attempt`). A response that arrives but does not
//! validate is returned as [`DocumentError::InvalidResponse`] immediately.
//! The default of zero retries makes every failure terminal.

use crate::config::ServiceConfig;
use crate::error::{DocumentError, InvoiceError};
use crate::pipeline::postprocess;
use crate::prompts::{document_message, DEFAULT_SYSTEM_PROMPT};
use crate::schema::Document;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Structures a single document's text.
///
/// `index` is the document's position in its batch and is only used to
/// label errors and log lines.
pub trait DocumentStructurer: Send + Sync {
    fn structure<'a>(
        &'a self,
        index: usize,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Document, DocumentError>>;
}

/// [`DocumentStructurer`] backed by a chat-completion provider.
pub struct LlmStructurer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmStructurer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, InvoiceError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    async fn structure_document(&self, index: usize, text: &str) -> Result<Document, DocumentError> {
        let start = Instant::now();
        let messages = build_messages(&self.system_prompt, text);

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = retry_delay_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Document {}: retry {}/{} after {}ms",
                    index, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "Document {}: {} input tokens, {} output tokens, {:?}",
                        index,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return postprocess::parse_document(&response.content)
                        .map_err(|detail| DocumentError::InvalidResponse { index, detail });
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Document {}: attempt {} failed: {}", index, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(DocumentError::LlmFailed {
            index,
            attempts: self.max_retries + 1,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

impl DocumentStructurer for LlmStructurer {
    fn structure<'a>(
        &'a self,
        index: usize,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Document, DocumentError>> {
        Box::pin(self.structure_document(index, text))
    }
}

/// System prompt first, then the document text as the only user turn.
fn build_messages(system_prompt: &str, text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(document_message(text)),
    ]
}

fn build_options(config: &ServiceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating instead of overflowing.
fn retry_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with the configured model;
///    the factory reads the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
///    when both are set and non-empty.
/// 4. **OpenAI** whenever `OPENAI_API_KEY` is set, so a machine with several
///    keys still defaults to the provider the prompt was tuned on.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn LLMProvider>, InvoiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ServiceConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_options_follow_config() {
        let config = ServiceConfig::builder()
            .temperature(0.4)
            .max_tokens(512)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.4));
        assert_eq!(opts.max_tokens, Some(512));
    }

    #[test]
    fn retry_delay_doubles_and_saturates() {
        assert_eq!(retry_delay_ms(500, 1), 500);
        assert_eq!(retry_delay_ms(500, 3), 2000);
        assert_eq!(retry_delay_ms(500, 65), u64::MAX);
        assert_eq!(retry_delay_ms(500, u32::MAX), u64::MAX);
    }

    #[test]
    fn messages_are_system_then_user() {
        let messages = build_messages("SYSTEM", "  invoice text \n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "SYSTEM");
        assert_eq!(messages[1].content, "invoice text");
    }
}
