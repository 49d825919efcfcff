//! Vision provider integration.
//!
//! Provides a provider abstraction over multiple captioning backends
//! (Gemini, OpenAI, Anthropic, Ollama) and the factory that picks one from
//! config.

pub(crate) mod anthropic;
pub(crate) mod gemini;
pub(crate) mod ollama;
pub(crate) mod openai;
pub mod provider;

pub use provider::{
    ImageInput, LlmProvider, LlmProviderFactory, LlmRequest, LlmResponse, RemoteFile, StagedImage,
};
