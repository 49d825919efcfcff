//! Configuration management for Chorus.
//!
//! Configuration is loaded once at startup from the platform config
//! directory (or an explicit path) and handed to the collector and analyzer.
//! Nothing below this layer reads the environment on its own, apart from
//! `${ENV_VAR}` credential references resolved by the provider factory.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Chorus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Consistency test settings
    pub consistency: ConsistencyConfig,

    /// Image source settings
    pub input: InputConfig,

    /// Prompt construction
    pub prompt: PromptConfig,

    /// Tabular baseline columns
    pub baseline: BaselineConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// LLM provider settings
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.chorus.chorus/config.toml
    /// - Linux: ~/.config/chorus/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\chorus\config\config.toml
    ///
    /// Falls back to ~/.chorus/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "chorus", "chorus")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".chorus").join("config.toml")
            })
    }

    /// Resolved input folder (with ~ expansion).
    pub fn input_dir(&self) -> PathBuf {
        expand(&self.input.folder)
    }

    /// Where the results file goes: absolute paths are kept, relative ones
    /// land in the input folder.
    pub fn results_path(&self) -> PathBuf {
        let path = expand(&self.output.results_file);
        if path.is_absolute() {
            path
        } else {
            self.input_dir().join(path)
        }
    }

    /// Session sidecar path inside the input folder.
    pub fn session_path(&self) -> PathBuf {
        self.input_dir().join(&self.prompt.session_file)
    }

    /// Validate the current values (used after CLI overrides are applied).
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
