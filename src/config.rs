//! Configuration for the extraction service and CLI.
//!
//! All behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. One struct carries the knobs of every external
//! collaborator (document parser, LLM, image generator) so the HTTP server
//! and the CLI share exactly the same defaults.

use crate::error::InvoiceError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default LLM model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Default LlamaParse endpoint.
pub const DEFAULT_LLAMA_PARSE_URL: &str = "https://api.cloud.llamaindex.ai";

/// Default Replicate endpoint.
pub const DEFAULT_REPLICATE_URL: &str = "https://api.replicate.com";

/// Default image model on Replicate.
pub const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/flux-1.1-pro-ultra";

/// Upper bound for [`ServiceConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for the invoice extraction pipeline.
///
/// Built via [`ServiceConfig::builder()`] or [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_extract::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .model("gpt-4.1-mini")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    // ── LLM ──────────────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gpt-4", "gpt-4.1-mini". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription, not writing; a deterministic model keeps
    /// the same invoice mapping to the same record.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per document. Default: 4096.
    pub max_tokens: usize,

    /// Extra attempts on a failed LLM call. Default: 0, at most [`MAX_RETRIES`].
    ///
    /// Failures are terminal for the attempt and the user retries by hand.
    /// Raise this only for unattended CLI runs.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in extraction prompt.
    pub system_prompt: Option<String>,

    /// Documents structured concurrently within one batch. Default: 8.
    pub concurrency: usize,

    // ── Document parser ──────────────────────────────────────────────────
    /// LlamaParse API key (`LLAMA_CLOUD_API_KEY`).
    pub llama_parse_api_key: Option<String>,

    /// LlamaParse base URL. Default: [`DEFAULT_LLAMA_PARSE_URL`].
    pub llama_parse_url: String,

    /// Result type requested from the parser. Default: "markdown".
    pub parse_result_type: String,

    /// Delay between job status polls in milliseconds. Default: 1000.
    pub parse_poll_interval_ms: u64,

    /// Maximum number of job status polls before giving up. Default: 120.
    pub parse_max_polls: u32,

    // ── Image generation ─────────────────────────────────────────────────
    /// Replicate API token (`REPLICATE_API_TOKEN`).
    pub replicate_api_token: Option<String>,

    /// Replicate base URL. Default: [`DEFAULT_REPLICATE_URL`].
    pub replicate_url: String,

    /// Replicate model, `owner/name`. Default: [`DEFAULT_IMAGE_MODEL`].
    pub image_model: String,

    /// Aspect ratio used when a request does not name one. Default: "3:2".
    pub default_aspect_ratio: String,

    // ── Transport ────────────────────────────────────────────────────────
    /// Timeout for each outbound API request in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,

    /// Optional callback for batch progress events (CLI runs).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            system_prompt: None,
            concurrency: 8,
            llama_parse_api_key: None,
            llama_parse_url: DEFAULT_LLAMA_PARSE_URL.to_string(),
            parse_result_type: "markdown".to_string(),
            parse_poll_interval_ms: 1000,
            parse_max_polls: 120,
            replicate_api_token: None,
            replicate_url: DEFAULT_REPLICATE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            default_aspect_ratio: "3:2".to_string(),
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            max_upload_bytes: 25 * 1024 * 1024,
            progress_callback: None,
        }
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("llama_parse_api_key", &redact(&self.llama_parse_api_key))
            .field("llama_parse_url", &self.llama_parse_url)
            .field("parse_result_type", &self.parse_result_type)
            .field("replicate_api_token", &redact(&self.replicate_api_token))
            .field("image_model", &self.image_model)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ServiceConfig`].
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl fmt::Debug for ServiceConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ServiceConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn llama_parse_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llama_parse_api_key = Some(key.into());
        self
    }

    pub fn llama_parse_url(mut self, url: impl Into<String>) -> Self {
        self.config.llama_parse_url = url.into();
        self
    }

    pub fn parse_result_type(mut self, result_type: impl Into<String>) -> Self {
        self.config.parse_result_type = result_type.into();
        self
    }

    pub fn parse_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.parse_poll_interval_ms = ms;
        self
    }

    pub fn parse_max_polls(mut self, n: u32) -> Self {
        self.config.parse_max_polls = n.max(1);
        self
    }

    pub fn replicate_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.replicate_api_token = Some(token.into());
        self
    }

    pub fn replicate_url(mut self, url: impl Into<String>) -> Self {
        self.config.replicate_url = url.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    pub fn default_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.config.default_aspect_ratio = ratio.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, InvoiceError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(InvoiceError::InvalidConfig(
                "Upload limit must be > 0 bytes".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(InvoiceError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if !c.image_model.contains('/') {
            return Err(InvoiceError::InvalidConfig(format!(
                "Image model must be 'owner/name', got '{}'",
                c.image_model
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ServiceConfig::default();
        assert_eq!(c.model_or_default(), "gpt-4");
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.default_aspect_ratio, "3:2");
        assert_eq!(c.parse_result_type, "markdown");
    }

    #[test]
    fn builder_clamps() {
        let c = ServiceConfig::builder()
            .temperature(9.0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn max_retries_is_capped() {
        let c = ServiceConfig::builder().max_retries(u32::MAX).build().unwrap();
        assert_eq!(c.max_retries, MAX_RETRIES);
        let c = ServiceConfig::builder().max_retries(3).build().unwrap();
        assert_eq!(c.max_retries, 3);
    }

    #[test]
    fn builder_rejects_bad_image_model() {
        let err = ServiceConfig::builder().image_model("flux").build().unwrap_err();
        assert!(matches!(err, InvoiceError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_upload_limit() {
        let err = ServiceConfig::builder()
            .max_upload_bytes(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Upload limit"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ServiceConfig::builder()
            .llama_parse_api_key("llx-secret")
            .replicate_api_token("r8-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("llx-secret"));
        assert!(!dbg.contains("r8-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
