//! Record extraction from raw captioning responses.
//!
//! Models wrap their JSON in markdown fences or chatter more often than not,
//! so the extractor strips known fence markers, falls back to the outermost
//! `{...}` span, and only then gives up with [`RunError::Extraction`].
//!
//! The mention test is a plain case-insensitive substring search. It will
//! count "Julianas" or "juliana.doe@..." as a mention and miss "Juliána".
//! Swap the [`MentionMatcher`] for something stricter if that matters.

use crate::error::{RunError, RunResult};
use crate::types::Record;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Decides whether a piece of free text mentions the subject.
pub trait MentionMatcher: Send + Sync {
    fn mentions(&self, text: &str) -> bool;
}

/// Lowercased substring containment.
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    needle: String,
}

impl SubstringMatcher {
    pub fn new(subject: &str) -> Self {
        Self {
            needle: subject.trim().to_lowercase(),
        }
    }
}

impl MentionMatcher for SubstringMatcher {
    fn mentions(&self, text: &str) -> bool {
        !self.needle.is_empty() && text.to_lowercase().contains(&self.needle)
    }
}

/// Keys that identify the caption object inside a response.
const CAPTION_KEYS: [&str; 3] = ["caption", "context", "keywords"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CaptionPayload {
    caption: Option<String>,
    #[serde(alias = "description", alias = "scene_description")]
    context: Option<String>,
    keywords: Option<KeywordField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeywordField {
    Taxonomy(KeywordTaxonomy),
    Flat(Vec<String>),
}

/// Categorized keywords. Only `subjects` matters here; other categories
/// (techniques, mood, ...) are accepted and ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeywordTaxonomy {
    subjects: Option<Vec<String>>,
}

impl KeywordField {
    fn into_subjects(self) -> Vec<String> {
        match self {
            KeywordField::Taxonomy(t) => t.subjects.unwrap_or_default(),
            KeywordField::Flat(list) => list,
        }
    }
}

/// Turns raw responses into [`Record`]s and classifies mentions.
#[derive(Clone)]
pub struct Extractor {
    matcher: Arc<dyn MentionMatcher>,
}

impl Extractor {
    pub fn new(matcher: Arc<dyn MentionMatcher>) -> Self {
        Self { matcher }
    }

    /// Extractor using the substring matcher for `subject`.
    pub fn for_subject(subject: &str) -> Self {
        Self::new(Arc::new(SubstringMatcher::new(subject)))
    }

    /// Parse one raw response into a successful record.
    pub fn extract(&self, raw: &str, image_id: &str, run_index: u32) -> RunResult<Record> {
        let value = parse_object(raw)?;
        let target = locate_caption_object(&value);
        let payload: CaptionPayload = serde_json::from_value(target.clone())
            .map_err(|e| RunError::Extraction(format!("malformed caption fields: {e}")))?;

        let mut record = Record {
            image_id: image_id.to_string(),
            run_index,
            caption: payload.caption.unwrap_or_default(),
            scene_description: payload.context.unwrap_or_default(),
            subject_keywords: payload
                .keywords
                .map(KeywordField::into_subjects)
                .unwrap_or_default(),
            subject_mentioned: None,
            failed: false,
            error: None,
        };
        record.subject_mentioned = Some(self.classify(&record));
        Ok(record)
    }

    /// Run the mention test over a record's text fields.
    pub fn classify(&self, record: &Record) -> bool {
        !record.failed && self.matcher.mentions(&record.searchable_text())
    }
}

/// Remove markdown code fences and surrounding whitespace.
pub fn strip_fences(raw: &str) -> String {
    raw.trim().replace("```json", "").replace("```", "").trim().to_string()
}

fn parse_object(raw: &str) -> RunResult<Value> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(RunError::Extraction("empty response".into()));
    }

    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(first) => {
            // Prose around the object: retry on the outermost braces.
            let span = cleaned
                .find('{')
                .zip(cleaned.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &cleaned[start..=end]);
            match span.and_then(|s| serde_json::from_str::<Value>(s).ok()) {
                Some(value) => value,
                None => return Err(RunError::Extraction(first.to_string())),
            }
        }
    };

    if value.is_object() {
        Ok(value)
    } else {
        Err(RunError::Extraction(format!(
            "expected a JSON object, got {}",
            type_name(&value)
        )))
    }
}

/// The caption fields live either at the top level or one mapping down
/// (e.g. `{"result": {"caption": ...}}`).
fn locate_caption_object(value: &Value) -> &Value {
    let has_keys = |v: &Value| {
        v.as_object()
            .is_some_and(|map| CAPTION_KEYS.iter().any(|k| map.contains_key(*k)))
    };
    if has_keys(value) {
        return value;
    }
    value
        .as_object()
        .and_then(|map| map.values().find(|v| has_keys(v)))
        .unwrap_or(value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
