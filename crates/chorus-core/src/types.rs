//! Core data types for consistency runs.
//!
//! A [`Record`] is the outcome of one attempt on one image. Records for the
//! same image form an [`ImageResultGroup`], and the ordered collection of
//! groups ([`ResultSet`]) is the single input the analyzer accepts, whether
//! it came from a live run, a baseline file or a persisted results file.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// An image scheduled for testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Stable identifier (the file name)
    pub image_id: String,
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// The normalized outcome of one attempt for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source image identifier
    #[serde(default)]
    pub image_id: String,

    /// 1-based position among the attempts for this image
    #[serde(default)]
    pub run_index: u32,

    /// Free-text caption (empty on failure)
    #[serde(default)]
    pub caption: String,

    /// Free-text scene description (empty on failure)
    #[serde(default, alias = "context")]
    pub scene_description: String,

    /// Subject keywords in the order the service returned them
    #[serde(
        default,
        alias = "keywords_subjects",
        deserialize_with = "keywords_from_list_or_string"
    )]
    pub subject_keywords: Vec<String>,

    /// Whether the subject name appears in any of the text fields.
    /// `None` when a loaded file carried no flag under this name.
    #[serde(default)]
    pub subject_mentioned: Option<bool>,

    /// The attempt produced no usable structured response
    #[serde(default)]
    pub failed: bool,

    /// Why the attempt failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Record {
    /// A record for an attempt that yielded nothing usable.
    pub fn failed(image_id: impl Into<String>, run_index: u32, error: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            run_index,
            caption: String::new(),
            scene_description: String::new(),
            subject_keywords: Vec::new(),
            subject_mentioned: Some(false),
            failed: true,
            error: Some(error.into()),
        }
    }

    /// Counts as a mention: a successful run flagged as mentioning the
    /// subject. Failed and unclassified runs never do.
    pub fn mentions_subject(&self) -> bool {
        !self.failed && self.subject_mentioned == Some(true)
    }

    /// The text the mention test runs over: caption, description and the
    /// comma-joined keywords, space separated.
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {}",
            self.caption,
            self.scene_description,
            self.subject_keywords.join(", ")
        )
    }
}

/// Accept keywords either as a list or as one comma-separated string.
fn keywords_from_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Keywords {
        List(Vec<String>),
        Joined(String),
        Missing(()),
    }

    Ok(match Keywords::deserialize(deserializer)? {
        Keywords::List(list) => list,
        Keywords::Joined(joined) => split_keywords(&joined),
        Keywords::Missing(()) => Vec::new(),
    })
}

/// Split a comma-joined keyword string, dropping blanks.
pub fn split_keywords(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// All records for one image, ordered by `run_index`.
///
/// Built once and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResultGroup {
    image_id: String,
    records: Vec<Record>,
}

impl ImageResultGroup {
    /// Build a group, stamping every record with the group's image id.
    ///
    /// Records without a run index (0) get their 1-based position; the
    /// result is stably sorted by run index. If that leaves two records on
    /// the same index, every record is renumbered by input position.
    pub fn new(image_id: impl Into<String>, records: Vec<Record>) -> Self {
        let image_id = image_id.into();
        let mut records: Vec<Record> = records
            .into_iter()
            .enumerate()
            .map(|(position, mut record)| {
                record.image_id = image_id.clone();
                if record.run_index == 0 {
                    record.run_index = position as u32 + 1;
                }
                record
            })
            .collect();

        let mut seen = HashSet::with_capacity(records.len());
        if !records.iter().all(|r| seen.insert(r.run_index)) {
            tracing::debug!("{}: run indices collide, renumbering", image_id);
            for (position, record) in records.iter_mut().enumerate() {
                record.run_index = position as u32 + 1;
            }
        }

        records.sort_by_key(|r| r.run_index);
        Self { image_id, records }
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered mapping of image id to its group.
///
/// Images keep the order in which they were first seen. Serializes as a
/// JSON object `{ image_id: [records...] }` with that order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    groups: Vec<ImageResultGroup>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a group. A group for an already-present image is merged into
    /// the existing one rather than listed twice.
    pub fn push(&mut self, group: ImageResultGroup) {
        match self
            .groups
            .iter_mut()
            .find(|g| g.image_id == group.image_id)
        {
            Some(existing) => {
                let mut records = std::mem::take(&mut existing.records);
                let offset = records.len() as u32;
                records.extend(group.records.into_iter().map(|mut r| {
                    r.run_index += offset;
                    r
                }));
                *existing = ImageResultGroup::new(group.image_id, records);
            }
            None => self.groups.push(group),
        }
    }

    /// Group loose records by image id, in first-seen order.
    ///
    /// Run indices are assigned per image from the record order.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut buckets: Vec<(String, Vec<Record>)> = Vec::new();
        for mut record in records {
            record.run_index = 0;
            match buckets.iter_mut().find(|(id, _)| *id == record.image_id) {
                Some((_, bucket)) => bucket.push(record),
                None => buckets.push((record.image_id.clone(), vec![record])),
            }
        }
        Self {
            groups: buckets
                .into_iter()
                .map(|(id, records)| ImageResultGroup::new(id, records))
                .collect(),
        }
    }

    pub fn groups(&self) -> &[ImageResultGroup] {
        &self.groups
    }

    pub fn get(&self, image_id: &str) -> Option<&ImageResultGroup> {
        self.groups.iter().find(|g| g.image_id == image_id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every record across all images.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.groups.iter().flat_map(|g| g.records.iter())
    }

    /// Rebuild every record's mention flag with a different classifier.
    pub fn reclassify(&self, classify: impl Fn(&Record) -> bool) -> Self {
        self.map_records(|record| {
            record.subject_mentioned = Some(!record.failed && classify(record));
        })
    }

    /// Records that carry no mention flag yet.
    pub fn unclassified_count(&self) -> usize {
        self.records()
            .filter(|r| r.subject_mentioned.is_none())
            .count()
    }

    /// Fill in missing mention flags with `classify`, keeping stored ones.
    pub fn classify_missing(&self, classify: impl Fn(&Record) -> bool) -> Self {
        self.map_records(|record| {
            if record.subject_mentioned.is_none() {
                record.subject_mentioned = Some(!record.failed && classify(record));
            }
        })
    }

    fn map_records(&self, update: impl Fn(&mut Record)) -> Self {
        let groups = self
            .groups
            .iter()
            .map(|group| {
                let records = group
                    .records
                    .iter()
                    .cloned()
                    .map(|mut record| {
                        update(&mut record);
                        record
                    })
                    .collect();
                ImageResultGroup::new(group.image_id.clone(), records)
            })
            .collect();
        Self { groups }
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.image_id, &group.records)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultSetVisitor;

        impl<'de> Visitor<'de> for ResultSetVisitor {
            type Value = ResultSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of image id to a list of run records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ResultSet, A::Error> {
                let mut set = ResultSet::new();
                while let Some((image_id, runs)) =
                    access.next_entry::<String, Vec<Option<Record>>>()?
                {
                    if image_id.is_empty() {
                        return Err(de::Error::custom("empty image id"));
                    }
                    // A null entry is an attempt that produced nothing.
                    let records = runs
                        .into_iter()
                        .enumerate()
                        .map(|(position, run)| {
                            run.unwrap_or_else(|| {
                                Record::failed(
                                    image_id.clone(),
                                    position as u32 + 1,
                                    "no result recorded",
                                )
                            })
                        })
                        .collect();
                    set.push(ImageResultGroup::new(image_id, records));
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ResultSetVisitor)
    }
}

/// Per-image reduction of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVerdict {
    pub image_id: String,
    /// All records, failed ones included
    pub run_count: usize,
    /// Successful records flagged as mentioning the subject
    pub mention_count: usize,
    /// Records with `failed`
    pub failed_count: usize,
    /// `mention_count / run_count`, 0 when there are no runs
    pub consistency_rate: f64,
    /// Rate is exactly 0 or exactly 1
    pub is_consistent: bool,
}

impl ConsistencyVerdict {
    /// A group with no records at all. Consistent by the literal rule,
    /// reported separately so it is not mistaken for a unanimous result.
    pub fn is_empty(&self) -> bool {
        self.run_count == 0
    }
}

/// Aggregate over every image in a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Subject the mention flags refer to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub total_images: usize,
    pub consistent_images: usize,
    /// `consistent_images / total_images * 100`, 0 when there are no images
    pub overall_consistency_percent: f64,
    pub total_runs: usize,
    pub total_mentions: usize,
    pub failed_runs: usize,
    /// Share of all runs that mention the subject
    pub mention_rate_percent: f64,
    /// Per-image verdicts in result-set order
    pub verdicts: Vec<ConsistencyVerdict>,
}

impl AggregateReport {
    pub fn inconsistent_images(&self) -> usize {
        self.total_images - self.consistent_images
    }
}
