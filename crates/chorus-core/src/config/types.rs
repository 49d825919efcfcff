//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// How the consistency test is run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Name token whose presence is counted (matched case-insensitively)
    pub subject: String,

    /// Number of attempts per image
    pub repeat_count: u32,

    /// Pause between attempts on the same image, in milliseconds
    pub attempt_delay_ms: u64,

    /// Pause between images, in milliseconds
    pub image_delay_ms: u64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            subject: "juliana".to_string(),
            repeat_count: 3,
            attempt_delay_ms: 2000,
            image_delay_ms: 3000,
        }
    }
}

/// Where test images come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Folder holding the test images (and the session sidecar file)
    pub folder: String,

    /// Image extensions to pick up
    pub supported_formats: Vec<String>,

    /// Descend into subdirectories
    pub recursive: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            folder: ".".to_string(),
            supported_formats: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            recursive: false,
        }
    }
}

/// Prompt construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Optional template file replacing the built-in prompt.
    /// Must contain a `{session_context}` placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,

    /// Session sidecar file name, resolved inside the input folder
    pub session_file: String,

    /// Context used when the sidecar file is absent
    pub default_context: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_path: None,
            session_file: "session.json".to_string(),
            default_context: "No session context provided.".to_string(),
        }
    }
}

/// Column names of a tabular baseline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub image_column: String,
    pub caption_column: String,
    pub context_column: String,
    pub keywords_column: String,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            image_column: "arquivo".to_string(),
            caption_column: "legenda".to_string(),
            context_column: "contexto".to_string(),
            keywords_column: "keywords_assuntos".to_string(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Results file name, resolved inside the input folder unless absolute
    pub results_file: String,

    /// Results format ("json" map or "jsonl" one image per line)
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,

    /// Characters of each caption shown in the console report
    pub excerpt_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_file: "test_results.json".to_string(),
            format: "json".to_string(),
            pretty: true,
            excerpt_chars: 100,
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Images larger than this are skipped
    pub max_file_size_mb: u64,

    /// LLM call timeout in milliseconds
    pub llm_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 20,
            llm_timeout_ms: 60000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// LLM provider configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used by `chorus run` ("gemini", "openai", "anthropic", "ollama")
    pub provider: String,

    /// Maximum tokens to generate per caption
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Google Gemini configuration
    pub gemini: Option<GeminiConfig>,

    /// OpenAI (or compatible) configuration
    pub openai: Option<OpenAiConfig>,

    /// Anthropic configuration
    pub anthropic: Option<AnthropicConfig>,

    /// Ollama (local) configuration
    pub ollama: Option<OllamaConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            max_tokens: 1024,
            temperature: 0.4,
            gemini: None,
            openai: None,
            anthropic: None,
            ollama: None,
        }
    }
}

/// Gemini configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base URL
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            api_key: "${GEMINI_API_KEY}".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Chat Completions endpoint (override for compatible hosts)
    pub endpoint: String,

    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: "${OPENAI_API_KEY}".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Anthropic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: "${ANTHROPIC_API_KEY}".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama API endpoint
    pub endpoint: String,

    /// Model name
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
        }
    }
}
