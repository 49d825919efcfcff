//! Consistency analysis over a [`ResultSet`].
//!
//! Pure functions: no I/O, no logging. The same result set always produces
//! the same report, whichever source it was loaded from.

use crate::types::{AggregateReport, ConsistencyVerdict, ImageResultGroup, ResultSet};

/// Verdict for one image.
///
/// Failed records count toward `run_count` but never toward
/// `mention_count`, whatever flag they carry. Unclassified records count as
/// not mentioned. An image is consistent when every run agrees, i.e. the
/// rate is exactly 0 or exactly 1.
pub fn verdict(group: &ImageResultGroup) -> ConsistencyVerdict {
    let records = group.records();
    let run_count = records.len();
    let mention_count = records.iter().filter(|r| r.mentions_subject()).count();
    let failed_count = records.iter().filter(|r| r.failed).count();

    let consistency_rate = if run_count == 0 {
        0.0
    } else {
        mention_count as f64 / run_count as f64
    };

    ConsistencyVerdict {
        image_id: group.image_id().to_string(),
        run_count,
        mention_count,
        failed_count,
        consistency_rate,
        is_consistent: consistency_rate == 0.0 || consistency_rate == 1.0,
    }
}

/// Aggregate report for a whole result set, verdicts in result-set order.
pub fn analyze(results: &ResultSet) -> AggregateReport {
    let verdicts: Vec<ConsistencyVerdict> = results.groups().iter().map(verdict).collect();

    let total_images = verdicts.len();
    let consistent_images = verdicts.iter().filter(|v| v.is_consistent).count();
    let total_runs: usize = verdicts.iter().map(|v| v.run_count).sum();
    let total_mentions: usize = verdicts.iter().map(|v| v.mention_count).sum();
    let failed_runs: usize = verdicts.iter().map(|v| v.failed_count).sum();

    AggregateReport {
        subject: None,
        total_images,
        consistent_images,
        overall_consistency_percent: percent(consistent_images, total_images),
        total_runs,
        total_mentions,
        failed_runs,
        mention_rate_percent: percent(total_mentions, total_runs),
        verdicts,
    }
}

/// Same as [`analyze`], tagging the report with the subject it measured.
pub fn analyze_for(results: &ResultSet, subject: &str) -> AggregateReport {
    AggregateReport {
        subject: Some(subject.to_string()),
        ..analyze(results)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Round to one decimal place, halves away from zero.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Render a percentage with exactly one decimal, e.g. `66.7`.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}", round1(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn run(image: &str, mentioned: bool) -> Record {
        Record {
            image_id: image.to_string(),
            run_index: 0,
            caption: String::new(),
            scene_description: String::new(),
            subject_keywords: vec![],
            subject_mentioned: Some(mentioned),
            failed: false,
            error: None,
        }
    }

    fn group(image: &str, flags: &[bool]) -> ImageResultGroup {
        ImageResultGroup::new(image, flags.iter().map(|&m| run(image, m)).collect())
    }

    fn set(groups: Vec<ImageResultGroup>) -> ResultSet {
        let mut results = ResultSet::new();
        for g in groups {
            results.push(g);
        }
        results
    }

    #[test]
    fn test_unanimous_runs_are_consistent() {
        for mentions in [0usize, 3] {
            let flags: Vec<bool> = (0..3).map(|i| i < mentions).collect();
            let v = verdict(&group("a.jpg", &flags));
            assert_eq!(v.mention_count, mentions);
            assert!(v.is_consistent, "{mentions}/3 should be consistent");
        }
    }

    #[test]
    fn test_split_runs_are_inconsistent() {
        for mentions in [1usize, 2] {
            let flags: Vec<bool> = (0..3).map(|i| i < mentions).collect();
            let v = verdict(&group("a.jpg", &flags));
            assert!(!v.is_consistent, "{mentions}/3 should be inconsistent");
            assert!(v.consistency_rate > 0.0 && v.consistency_rate < 1.0);
        }
    }

    #[test]
    fn test_mention_count_bounded_by_run_count() {
        let v = verdict(&group("a.jpg", &[true, false, true, true, false]));
        assert!(v.mention_count <= v.run_count);
        assert_eq!(v.run_count, 5);
        assert_eq!(v.mention_count, 3);
        assert!((v.consistency_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_failed_runs_stay_in_denominator() {
        let records = vec![
            run("a.jpg", true),
            run("a.jpg", true),
            Record::failed("a.jpg", 3, "HTTP 500"),
        ];
        let v = verdict(&ImageResultGroup::new("a.jpg", records));
        assert_eq!(v.run_count, 3);
        assert_eq!(v.mention_count, 2);
        assert_eq!(v.failed_count, 1);
        assert!(!v.is_consistent);
    }

    #[test]
    fn test_failed_run_flagged_as_mention_is_not_counted() {
        let mut failed = Record::failed("a.jpg", 2, "HTTP 500");
        failed.subject_mentioned = Some(true);
        let records = vec![run("a.jpg", true), failed];
        let v = verdict(&ImageResultGroup::new("a.jpg", records));
        assert_eq!(v.run_count, 2);
        assert_eq!(v.mention_count, 1);
        assert_eq!(v.failed_count, 1);
        assert!(!v.is_consistent);
    }

    #[test]
    fn test_empty_group_is_consistent_but_flagged() {
        let v = verdict(&ImageResultGroup::new("a.jpg", vec![]));
        assert_eq!(v.consistency_rate, 0.0);
        assert!(v.is_consistent);
        assert!(v.is_empty());
    }

    #[test]
    fn test_overall_percent() {
        let report = analyze(&set(vec![
            group("a.jpg", &[true, true, false]),
            group("b.jpg", &[true, true, true]),
            group("c.jpg", &[false, false, false]),
        ]));
        assert_eq!(report.total_images, 3);
        assert_eq!(report.consistent_images, 2);
        assert_eq!(report.inconsistent_images(), 1);
        assert_eq!(format_percent(report.overall_consistency_percent), "66.7");
        assert_eq!(report.total_runs, 9);
        assert_eq!(report.total_mentions, 5);
        assert_eq!(format_percent(report.mention_rate_percent), "55.6");
    }

    #[test]
    fn test_all_consistent_is_100() {
        let report = analyze(&set(vec![
            group("a.jpg", &[true, true]),
            group("b.jpg", &[false, false]),
        ]));
        assert_eq!(report.overall_consistency_percent, 100.0);
    }

    #[test]
    fn test_none_consistent_is_0() {
        let report = analyze(&set(vec![
            group("a.jpg", &[true, false]),
            group("b.jpg", &[false, true]),
        ]));
        assert_eq!(report.overall_consistency_percent, 0.0);
    }

    #[test]
    fn test_empty_result_set() {
        let report = analyze(&ResultSet::new());
        assert_eq!(report.total_images, 0);
        assert_eq!(report.overall_consistency_percent, 0.0);
        assert_eq!(report.mention_rate_percent, 0.0);
        assert!(report.verdicts.is_empty());
    }

    #[test]
    fn test_verdicts_follow_result_set_order() {
        let report = analyze(&set(vec![
            group("z.jpg", &[true]),
            group("a.jpg", &[false]),
        ]));
        let ids: Vec<&str> = report.verdicts.iter().map(|v| v.image_id.as_str()).collect();
        assert_eq!(ids, vec!["z.jpg", "a.jpg"]);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let results = set(vec![group("a.jpg", &[true, false, true])]);
        assert_eq!(analyze(&results), analyze(&results));
    }

    #[test]
    fn test_analyze_for_sets_subject() {
        let report = analyze_for(&ResultSet::new(), "juliana");
        assert_eq!(report.subject.as_deref(), Some("juliana"));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(format_percent(2.0 / 3.0 * 100.0), "66.7");
        assert_eq!(format_percent(100.0 / 3.0), "33.3");
        assert_eq!(format_percent(12.25), "12.3");
        assert_eq!(format_percent(0.0), "0.0");
        assert_eq!(format_percent(100.0), "100.0");
    }
}
