//! CLI enum types shared by the commands.

use clap::ValueEnum;

/// Supported vision providers.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Provider {
    /// Google Gemini API (default)
    Gemini,
    /// OpenAI API
    Openai,
    /// Anthropic API
    Anthropic,
    /// Local Ollama instance
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Openai => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}
