//! Human-readable and structured renderings of an [`AggregateReport`].

use crate::analysis::format_percent;
use crate::types::{AggregateReport, ConsistencyVerdict, Record, ResultSet};
use serde_json::{json, Value};
use std::fmt;

const RULE_WIDTH: usize = 80;

/// Both renderings of one report.
#[derive(Debug, Clone)]
pub struct FormattedReport {
    /// Multi-line text for the terminal
    pub human_text: String,
    /// The same content as JSON
    pub structured: Value,
}

/// Status label for a verdict.
pub fn status_label(verdict: &ConsistencyVerdict) -> &'static str {
    if verdict.is_empty() {
        "[--] NO RUNS"
    } else if verdict.is_consistent {
        "[OK] CONSISTENT"
    } else {
        "[!!] INCONSISTENT"
    }
}

/// Per-run mark: `+` mentioned, `-` not mentioned, `x` failed.
pub fn run_mark(record: &Record) -> char {
    if record.failed {
        'x'
    } else if record.mentions_subject() {
        '+'
    } else {
        '-'
    }
}

/// First `max_chars` characters of `text`, with `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Render a report. `results` supplies the per-run excerpts; images in the
/// report but missing from `results` are listed without runs.
pub fn format_report(
    report: &AggregateReport,
    results: &ResultSet,
    excerpt_chars: usize,
) -> FormattedReport {
    FormattedReport {
        human_text: HumanText {
            report,
            results,
            excerpt_chars,
        }
        .to_string(),
        structured: structured(report, results, excerpt_chars),
    }
}

fn subject_name(report: &AggregateReport) -> &str {
    report.subject.as_deref().unwrap_or("subject")
}

fn run_line(record: &Record, excerpt_chars: usize) -> String {
    let body = if record.failed {
        format!(
            "failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        )
    } else {
        excerpt(&record.caption, excerpt_chars)
    };
    format!("[{}] Run {}: {}", run_mark(record), record.run_index, body)
}

/// Terminal rendering of a report, built through [`fmt::Display`].
struct HumanText<'a> {
    report: &'a AggregateReport,
    results: &'a ResultSet,
    excerpt_chars: usize,
}

impl fmt::Display for HumanText<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_human_text(out, self.report, self.results, self.excerpt_chars)
    }
}

fn write_human_text(
    out: &mut fmt::Formatter<'_>,
    report: &AggregateReport,
    results: &ResultSet,
    excerpt_chars: usize,
) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    let subject = subject_name(report);

    writeln!(out, "{rule}")?;
    writeln!(out, "CONSISTENCY BY IMAGE")?;
    writeln!(out, "{rule}")?;

    for verdict in &report.verdicts {
        writeln!(out)?;
        writeln!(out, "{}:", verdict.image_id)?;
        writeln!(out, "  Status: {}", status_label(verdict))?;
        writeln!(
            out,
            "  {subject} mentioned in {}/{} runs ({}%)",
            verdict.mention_count,
            verdict.run_count,
            format_percent(verdict.consistency_rate * 100.0)
        )?;
        if verdict.failed_count > 0 {
            writeln!(out, "  Failed runs: {}", verdict.failed_count)?;
        }
        if let Some(group) = results.get(&verdict.image_id) {
            for record in group.records() {
                writeln!(out, "  {}", run_line(record, excerpt_chars))?;
            }
        }
    }

    let empty: Vec<&str> = report
        .verdicts
        .iter()
        .filter(|v| v.is_empty())
        .map(|v| v.image_id.as_str())
        .collect();

    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "OVERALL RESULT")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Images tested: {}", report.total_images)?;
    writeln!(out, "Consistent images: {}", report.consistent_images)?;
    writeln!(out, "Inconsistent images: {}", report.inconsistent_images())?;
    if !empty.is_empty() {
        writeln!(out, "Images with no runs: {}", empty.join(", "))?;
    }
    writeln!(
        out,
        "OVERALL CONSISTENCY: {}%",
        format_percent(report.overall_consistency_percent)
    )?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Total runs: {}", report.total_runs)?;
    writeln!(out, "Failed runs: {}", report.failed_runs)?;
    writeln!(out, "Times {subject} was mentioned: {}", report.total_mentions)?;
    writeln!(
        out,
        "Mention rate: {}%",
        format_percent(report.mention_rate_percent)
    )?;
    write!(out, "{rule}")
}

fn structured(report: &AggregateReport, results: &ResultSet, excerpt_chars: usize) -> Value {
    let images: Vec<Value> = report
        .verdicts
        .iter()
        .map(|verdict| {
            let runs: Vec<Value> = results
                .get(&verdict.image_id)
                .map(|group| {
                    group
                        .records()
                        .iter()
                        .map(|r| {
                            json!({
                                "run_index": r.run_index,
                                "subject_mentioned": r.mentions_subject(),
                                "failed": r.failed,
                                "error": r.error,
                                "caption_excerpt": excerpt(&r.caption, excerpt_chars),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "image_id": verdict.image_id,
                "status": status_label(verdict),
                "run_count": verdict.run_count,
                "mention_count": verdict.mention_count,
                "failed_count": verdict.failed_count,
                "consistency_rate": verdict.consistency_rate,
                "is_consistent": verdict.is_consistent,
                "no_runs": verdict.is_empty(),
                "runs": runs,
            })
        })
        .collect();

    json!({
        "subject": report.subject,
        "summary": {
            "total_images": report.total_images,
            "consistent_images": report.consistent_images,
            "inconsistent_images": report.inconsistent_images(),
            "overall_consistency_percent": format_percent(report.overall_consistency_percent),
            "total_runs": report.total_runs,
            "total_mentions": report.total_mentions,
            "failed_runs": report.failed_runs,
            "mention_rate_percent": format_percent(report.mention_rate_percent),
        },
        "images": images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_for;
    use crate::types::ImageResultGroup;

    fn record(caption: &str, mentioned: bool) -> Record {
        Record {
            image_id: String::new(),
            run_index: 0,
            caption: caption.to_string(),
            scene_description: String::new(),
            subject_keywords: vec![],
            subject_mentioned: Some(mentioned),
            failed: false,
            error: None,
        }
    }

    fn sample() -> ResultSet {
        let mut results = ResultSet::new();
        results.push(ImageResultGroup::new(
            "IMG_01.jpg",
            vec![
                record("Juliana sorri para a câmera", true),
                record("Juliana no jardim", true),
                record("Mulher no jardim", false),
            ],
        ));
        results.push(ImageResultGroup::new(
            "IMG_02.jpg",
            vec![
                record("Juliana e a filha", true),
                record("Juliana e a filha", true),
                Record::failed("IMG_02.jpg", 3, "HTTP 503"),
            ],
        ));
        results.push(ImageResultGroup::new("IMG_03.jpg", vec![]));
        results
    }

    #[test]
    fn test_excerpt_counts_characters() {
        assert_eq!(excerpt("câmera", 3), "câm...");
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("exact", 5), "exact");
        assert_eq!(excerpt("", 5), "");
    }

    #[test]
    fn test_human_text_layout() {
        let results = sample();
        let report = analyze_for(&results, "Juliana");
        let text = format_report(&report, &results, 10).human_text;

        assert!(text.contains("IMG_01.jpg:\n  Status: [!!] INCONSISTENT"));
        assert!(text.contains("Juliana mentioned in 2/3 runs (66.7%)"));
        assert!(text.contains("[+] Run 1: Juliana so..."));
        assert!(text.contains("[-] Run 3: Mulher no ..."));
        assert!(text.contains("[x] Run 3: failed: HTTP 503"));
        assert!(text.contains("IMG_03.jpg:\n  Status: [--] NO RUNS"));
        assert!(text.contains("Images with no runs: IMG_03.jpg"));
        assert!(text.contains("OVERALL CONSISTENCY: 33.3%"));
        assert!(text.contains("Mention rate: 66.7%"));
    }

    #[test]
    fn test_human_text_framed_by_rules() {
        let results = sample();
        let report = analyze_for(&results, "Juliana");
        let text = format_report(&report, &results, 10).human_text;
        let rule = "=".repeat(RULE_WIDTH);

        assert!(text.starts_with(&format!("{rule}\nCONSISTENCY BY IMAGE\n{rule}\n")));
        assert!(text.ends_with(&format!("Mention rate: 66.7%\n{rule}")));
        assert_eq!(text.matches(&rule).count(), 6);
    }

    #[test]
    fn test_structured_matches_report() {
        let results = sample();
        let report = analyze_for(&results, "Juliana");
        let value = format_report(&report, &results, 100).structured;

        assert_eq!(value["subject"], "Juliana");
        assert_eq!(value["summary"]["total_images"], 3);
        assert_eq!(value["summary"]["consistent_images"], 1);
        assert_eq!(value["summary"]["overall_consistency_percent"], "33.3");
        assert_eq!(value["images"][1]["runs"][2]["failed"], true);
        assert_eq!(value["images"][2]["no_runs"], true);
        assert_eq!(value["images"][0]["status"], "[!!] INCONSISTENT");
    }

    #[test]
    fn test_empty_report() {
        let results = ResultSet::new();
        let report = analyze_for(&results, "Juliana");
        let text = format_report(&report, &results, 100).human_text;
        assert!(text.contains("Images tested: 0"));
        assert!(text.contains("OVERALL CONSISTENCY: 0.0%"));
    }
}
