//! Baseline loader: captioning results that already exist in a CSV file.
//!
//! Each row is one attempt. Rows are grouped by image id in the order ids
//! first appear, and every row goes through the same mention classifier as a
//! live run, so the analyzer cannot tell the two sources apart.

use crate::config::BaselineConfig;
use crate::error::{ChorusError, Result};
use crate::pipeline::extract::Extractor;
use crate::types::{split_keywords, Record, ResultSet};
use std::path::Path;

/// Header positions of the four columns we read.
struct Columns {
    image: usize,
    caption: usize,
    context: usize,
    keywords: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, names: &BaselineConfig, path: &Path) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ChorusError::Baseline {
                    path: path.to_path_buf(),
                    message: format!("missing column '{name}'"),
                })
        };
        Ok(Self {
            image: find(&names.image_column)?,
            caption: find(&names.caption_column)?,
            context: find(&names.context_column)?,
            keywords: find(&names.keywords_column)?,
        })
    }
}

/// Load a baseline CSV into a result set.
///
/// Images appear in the order their first row appears in the file, not
/// sorted by name; runs for each image follow row order.
pub fn load_baseline(
    path: &Path,
    columns: &BaselineConfig,
    extractor: &Extractor,
) -> Result<ResultSet> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let cols = Columns::locate(&headers, columns, path)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = row?;
        let cell = |idx: usize| row.get(idx).unwrap_or("").trim().to_string();

        let image_id = cell(cols.image);
        if image_id.is_empty() {
            skipped += 1;
            continue;
        }

        let mut record = Record {
            image_id,
            run_index: 0,
            caption: cell(cols.caption),
            scene_description: cell(cols.context),
            subject_keywords: split_keywords(&cell(cols.keywords)),
            subject_mentioned: None,
            failed: false,
            error: None,
        };
        record.subject_mentioned = Some(extractor.classify(&record));
        records.push(record);
    }

    if skipped > 0 {
        tracing::warn!("Skipped {skipped} baseline rows without an image id");
    }
    tracing::info!("Loaded {} baseline rows from {:?}", records.len(), path);

    Ok(ResultSet::from_records(records))
}
