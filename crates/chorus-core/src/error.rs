//! Error types for consistency runs.
//!
//! Only configuration problems are fatal. Everything that can go wrong while
//! talking to a vision provider is a [`RunError`], which the collector folds
//! into a failed [`Record`](crate::types::Record) instead of propagating.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Chorus operations.
#[derive(Error, Debug)]
pub enum ChorusError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tabular baseline could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Baseline file is readable but does not have the expected shape
    #[error("Baseline error in {path}: {message}")]
    Baseline { path: PathBuf, message: String },

    /// Persisted results file is neither a JSON map nor JSON lines
    #[error("Unrecognized results file {path}: {message}")]
    Results { path: PathBuf, message: String },
}

/// Configuration-specific errors. All of these abort before any invocation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A provider needs a credential that is not set
    #[error("{provider} API key not set. Set {hint}.")]
    MissingCredential { provider: String, hint: String },
}

/// Failure of a single attempt against one image.
///
/// Recoverable by definition: the collector records it and moves on.
#[derive(Error, Debug)]
pub enum RunError {
    /// The provider call errored (network, quota, HTTP status)
    #[error("{message}")]
    Invocation {
        message: String,
        status_code: Option<u16>,
    },

    /// The provider answered but the payload is not a usable caption record
    #[error("Unparsable response: {0}")]
    Extraction(String),

    /// The provider did not answer within the configured limit
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The image itself could not be read
    #[error("Failed to read {path}: {message}")]
    ImageRead { path: PathBuf, message: String },

    /// Cleanup of a transient remote resource failed
    #[error("Failed to release {resource}: {message}")]
    Release { resource: String, message: String },
}

impl RunError {
    pub(crate) fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
            status_code: None,
        }
    }
}

/// Convenience type alias for Chorus results.
pub type Result<T> = std::result::Result<T, ChorusError>;

/// Convenience type alias for per-attempt results.
pub type RunResult<T> = std::result::Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_the_variable() {
        let err = ConfigError::MissingCredential {
            provider: "Gemini".into(),
            hint: "GEMINI_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "Gemini API key not set. Set GEMINI_API_KEY."
        );
    }

    #[test]
    fn invocation_message_is_passed_through() {
        let err = RunError::Invocation {
            message: "Gemini HTTP 429: quota".into(),
            status_code: Some(429),
        };
        assert_eq!(err.to_string(), "Gemini HTTP 429: quota");
    }

    #[test]
    fn config_error_wraps_into_top_level() {
        let err: ChorusError = ConfigError::ValidationError("bad".into()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
