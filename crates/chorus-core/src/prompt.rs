//! Captioning prompt: a template with one `{session_context}` slot.
//!
//! The session context is free text (usually JSON describing who appears in
//! the shoot) read from a sidecar file next to the images.

use crate::config::Config;
use crate::error::ConfigError;
use std::path::Path;

/// Placeholder replaced with the session context.
pub const CONTEXT_PLACEHOLDER: &str = "{session_context}";

/// Built-in cataloguing prompt.
pub const DEFAULT_TEMPLATE: &str = r#"Your only task is to analyse the image and return a JSON object.

You are a professional photographer cataloguing this image for a portfolio.
Identify specific people by name whenever possible so the catalogue can be
searched by person later.

---
SESSION CONTEXT:
{session_context}
---

RULES FOR IDENTIFYING PEOPLE:
1. If the person matches the description of the PRIMARY client in the session
   context, use her or his name in the caption, the context and the keywords.
2. For people marked SECONDARY or TERTIARY, use their names when the visual
   cues give reasonable confidence.
3. Fall back to generic terms (mother, child, woman, man) only when you cannot
   tell who the person is.
4. Be consistent: once someone is named, keep naming them in similar photos.

REQUIRED JSON STRUCTURE:
{
  "caption": "Descriptive caption including the NAMES of identified people. Focus on subject, action and setting.",
  "keywords": {
    "subjects": ["Person name", "object", "place"],
    "techniques": ["photographic technique", "light type"],
    "mood": ["emotion", "atmosphere"]
  },
  "category": "portrait | family | group | product | event | landscape",
  "context": "Detailed description of the scene including the NAMES of identified people."
}

Answer with the JSON object only, no additional text."#;

/// A template ready to be rendered with session context.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Use a custom template. It must contain the context placeholder.
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(CONTEXT_PLACEHOLDER) {
            return Err(ConfigError::ValidationError(format!(
                "prompt template must contain {CONTEXT_PLACEHOLDER}"
            )));
        }
        Ok(Self { template })
    }

    /// The configured template: a file when `prompt.template_path` is set,
    /// otherwise the built-in one.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match &config.prompt.template_path {
            Some(path) => {
                let path = shellexpand::tilde(path).into_owned();
                let template = std::fs::read_to_string(&path)?;
                Self::new(template)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn render(&self, session_context: &str) -> String {
        self.template.replace(CONTEXT_PLACEHOLDER, session_context)
    }
}

/// Read the session sidecar, or fall back to `default` when it is absent.
pub fn load_session_context(path: &Path, default: &str) -> Result<String, ConfigError> {
    if path.exists() {
        tracing::info!("Using session context from {:?}", path);
        Ok(std::fs::read_to_string(path)?)
    } else {
        tracing::debug!("No session context at {:?}", path);
        Ok(default.to_string())
    }
}

/// Render the full prompt for a run from config.
pub fn build_prompt(config: &Config) -> Result<String, ConfigError> {
    let template = PromptTemplate::from_config(config)?;
    let context = load_session_context(&config.session_path(), &config.prompt.default_context)?;
    Ok(template.render(&context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_has_placeholder() {
        assert!(DEFAULT_TEMPLATE.contains(CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn test_render_substitutes_context() {
        let prompt = PromptTemplate::default().render("PRIMARY: Juliana");
        assert!(prompt.contains("PRIMARY: Juliana"));
        assert!(!prompt.contains(CONTEXT_PLACEHOLDER));
        assert!(prompt.contains("\"subjects\""));
    }

    #[test]
    fn test_custom_template_requires_placeholder() {
        assert!(PromptTemplate::new("no slot here").is_err());
        let t = PromptTemplate::new("ctx={session_context}").unwrap();
        assert_eq!(t.render("x"), "ctx=x");
    }

    #[test]
    fn test_session_context_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let context =
            load_session_context(&dir.path().join("session.json"), "nothing here").unwrap();
        assert_eq!(context, "nothing here");
    }

    #[test]
    fn test_build_prompt_reads_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("session.json"),
            r#"{"people": [{"name": "Juliana", "role": "PRIMARY"}]}"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.input.folder = dir.path().to_string_lossy().into_owned();

        let prompt = build_prompt(&config).unwrap();
        assert!(prompt.contains(r#""role": "PRIMARY""#));
    }

    #[test]
    fn test_build_prompt_with_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("prompt.txt");
        std::fs::write(&template_path, "Describe. Context: {session_context}").unwrap();
        let mut config = Config::default();
        config.input.folder = dir.path().to_string_lossy().into_owned();
        config.prompt.template_path = Some(template_path.to_string_lossy().into_owned());

        let prompt = build_prompt(&config).unwrap();
        assert_eq!(prompt, "Describe. Context: No session context provided.");
    }
}
