//! LLM provider trait and request/response types.
//!
//! Defines the interface every vision provider implements, plus the factory
//! that builds the configured provider. Providers that need the image
//! uploaded somewhere first do it in [`LlmProvider::stage`] and clean up in
//! [`LlmProvider::release`]; inline providers keep the defaults.

use crate::config::LlmConfig;
use crate::error::{ConfigError, RunError, RunResult};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

/// Base64-encoded image ready to send to an LLM API.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl ImageInput {
    /// Create an `ImageInput` from raw bytes and a file extension.
    pub fn from_bytes(bytes: &[u8], extension: &str) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type_for(extension).to_string(),
        }
    }

    /// Return a data URL suitable for OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }

    /// Raw bytes back out of the base64 payload.
    pub fn bytes(&self) -> RunResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| RunError::invocation(format!("corrupt image payload: {e}")))
    }
}

/// MIME type for an image file extension.
pub fn media_type_for(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        other => {
            tracing::warn!("Unknown image extension '{other}', defaulting to image/jpeg");
            "image/jpeg"
        }
    }
}

/// A file held by the provider on our behalf until released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Provider resource name used for deletion (e.g. "files/abc123")
    pub name: String,
    /// URI used to reference the file in requests
    pub uri: String,
    pub media_type: String,
}

/// An image in the form a provider wants to receive it.
#[derive(Debug, Clone)]
pub enum StagedImage {
    /// Sent inline with every request
    Inline(ImageInput),
    /// Uploaded beforehand; must be released after use
    Remote(RemoteFile),
}

impl StagedImage {
    /// Inline payload, or an error for providers that cannot take references.
    pub fn inline(&self, provider: &str) -> RunResult<&ImageInput> {
        match self {
            StagedImage::Inline(image) => Ok(image),
            StagedImage::Remote(file) => Err(RunError::invocation(format!(
                "{provider} cannot reference uploaded file {}",
                file.name
            ))),
        }
    }
}

/// A captioning request for one attempt.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The image to caption
    pub image: StagedImage,
    /// Rendered prompt
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

/// The response from an LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text, expected to hold a JSON caption object
    pub text: String,
    /// Model identifier used
    pub model: String,
    /// Number of tokens used (input + output), if reported
    pub tokens_used: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all vision providers implement.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (we need `Box<dyn LlmProvider>` for dynamic dispatch).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging (e.g., "gemini", "ollama").
    fn name(&self) -> &str;

    /// Check whether the provider is configured and reachable.
    async fn is_available(&self) -> bool;

    /// Prepare the image for a request. Inline by default.
    async fn stage(&self, image: &ImageInput) -> RunResult<StagedImage> {
        Ok(StagedImage::Inline(image.clone()))
    }

    /// Generate a caption for the given request.
    async fn generate(&self, request: &LlmRequest) -> RunResult<LlmResponse>;

    /// Free whatever `stage` acquired. Nothing to do for inline images.
    async fn release(&self, _staged: &StagedImage) -> RunResult<()> {
        Ok(())
    }

    /// Per-request timeout for this provider.
    fn timeout(&self) -> Duration;
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn require_key(value: &str, provider: &str, var: &str) -> Result<String, ConfigError> {
    resolve_env_var(value).ok_or_else(|| ConfigError::MissingCredential {
        provider: provider.to_string(),
        hint: format!("{var} (in the environment or a .env file)"),
    })
}

/// Factory that creates the configured provider.
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create a provider by name.
    ///
    /// # Arguments
    /// * `provider` - Provider identifier ("gemini", "openai", "anthropic", "ollama")
    /// * `config` - The full LLM config section
    /// * `model_override` - Optional model name that overrides the config default
    ///
    /// A missing credential is a configuration error: callers are expected to
    /// stop before any image is touched.
    pub fn create(
        provider: &str,
        config: &LlmConfig,
        model_override: Option<&str>,
    ) -> Result<Box<dyn LlmProvider>, ConfigError> {
        let pick = |default: &str| {
            model_override
                .map(String::from)
                .unwrap_or_else(|| default.to_string())
        };

        match provider {
            "gemini" => {
                let cfg = config.gemini.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "Gemini", "GEMINI_API_KEY")?;
                Ok(Box::new(super::gemini::GeminiProvider::new(
                    &cfg.endpoint,
                    &api_key,
                    &pick(&cfg.model),
                )))
            }
            "openai" => {
                let cfg = config.openai.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "OpenAI", "OPENAI_API_KEY")?;
                Ok(Box::new(super::openai::OpenAiProvider::with_endpoint(
                    &api_key,
                    &pick(&cfg.model),
                    &cfg.endpoint,
                )))
            }
            "anthropic" => {
                let cfg = config.anthropic.clone().unwrap_or_default();
                let api_key = require_key(&cfg.api_key, "Anthropic", "ANTHROPIC_API_KEY")?;
                Ok(Box::new(super::anthropic::AnthropicProvider::new(
                    &api_key,
                    &pick(&cfg.model),
                )))
            }
            "ollama" => {
                let cfg = config.ollama.clone().unwrap_or_default();
                Ok(Box::new(super::ollama::OllamaProvider::new(
                    &cfg.endpoint,
                    &pick(&cfg.model),
                )))
            }
            other => Err(ConfigError::ValidationError(format!(
                "Unknown LLM provider: {other} (expected gemini, openai, anthropic or ollama)"
            ))),
        }
    }
}
