//! Persistence for result sets in JSON and JSONL form.
//!
//! JSON writes the whole set as one object keyed by image id. JSONL writes
//! one `{"image_id": ..., "runs": [...]}` object per image per line. Loading
//! accepts either shape, plus a flat JSON array of records.

use crate::error::{ChorusError, Result};
use crate::types::{ImageResultGroup, Record, ResultSet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON object
    Json,
    /// One JSON object per image per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// One line of a JSONL results file.
#[derive(Serialize)]
struct GroupLine<'a> {
    image_id: &'a str,
    runs: &'a [Record],
}

#[derive(Deserialize)]
struct OwnedGroupLine {
    image_id: String,
    runs: Vec<Record>,
}

/// Writes result sets to any [`Write`] sink.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects JSON; JSONL is always one object per line.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    pub fn write_results(&mut self, results: &ResultSet) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.write_value(results)?,
            OutputFormat::JsonLines => {
                for group in results.groups() {
                    let line = GroupLine {
                        image_id: group.image_id(),
                        runs: group.records(),
                    };
                    serde_json::to_writer(&mut self.writer, &line).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                }
            }
        }
        Ok(())
    }

    /// Write any serializable value as a single JSON document.
    pub fn write_value<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Write a result set to `path`, creating parent directories as needed.
pub fn save_results(
    path: &Path,
    results: &ResultSet,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = OutputWriter::new(BufWriter::new(file), format, pretty);
    writer.write_results(results)?;
    writer.flush()?;
    tracing::info!("Results saved to {:?}", path);
    Ok(())
}

/// Read a result set previously written by [`save_results`].
pub fn load_results(path: &Path) -> Result<ResultSet> {
    let text = std::fs::read_to_string(path)?;
    parse_results(&text).map_err(|message| ChorusError::Results {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_results(text: &str) -> std::result::Result<ResultSet, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(ResultSet::new());
    }

    let json_error = match serde_json::from_str::<ResultSet>(trimmed) {
        Ok(results) => return Ok(results),
        Err(e) => e,
    };
    if let Ok(records) = serde_json::from_str::<Vec<Record>>(trimmed) {
        return Ok(ResultSet::from_records(records));
    }

    // JSON lines: every non-blank line must parse, otherwise report the
    // whole-document error, which is the more useful one for JSON files.
    let mut results = ResultSet::new();
    for (line_no, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<OwnedGroupLine>(line) {
            Ok(group) => results.push(ImageResultGroup::new(group.image_id, group.runs)),
            Err(_) if line_no == 0 => return Err(json_error.to_string()),
            Err(e) => return Err(format!("line {}: {e}", line_no + 1)),
        }
    }
    Ok(results)
}
