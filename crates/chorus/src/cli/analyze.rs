//! The `chorus analyze` command: re-analyze a saved results file.

use chorus_core::analysis::analyze_for;
use chorus_core::{load_results, Extractor, ResultSet};
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the `analyze` command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Results file written by `chorus run` or `chorus baseline --output`
    pub results: PathBuf,

    /// Re-test the stored captions for this subject instead of trusting the
    /// saved mention flags. Runs without a saved flag are always re-tested,
    /// against `consistency.subject` when this is not given
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the analyze command.
pub async fn execute(args: AnalyzeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let path = super::expand_path(&args.results);
    if !path.is_file() {
        anyhow::bail!("Results file does not exist: {:?}", path);
    }
    let stored = load_results(&path)?;
    tracing::info!("Loaded {} image(s) from {:?}", stored.len(), path);

    let (results, report) = match args.subject.as_deref().map(str::trim) {
        Some("") => anyhow::bail!("--subject must not be empty"),
        Some(subject) => {
            let extractor = Extractor::for_subject(subject);
            let results = stored.reclassify(|record| extractor.classify(record));
            let report = analyze_for(&results, subject);
            (results, report)
        }
        None => {
            let results = fill_missing_flags(stored, &config.consistency.subject);
            let report = analyze_for(&results, &config.consistency.subject);
            (results, report)
        }
    };

    super::print_report(&report, &results, config.output.excerpt_chars, args.json)
}

/// Classify runs saved without a `subject_mentioned` flag (e.g. files that
/// stored it under a subject-specific key) against `subject`.
fn fill_missing_flags(stored: ResultSet, subject: &str) -> ResultSet {
    let missing = stored.unclassified_count();
    if missing == 0 {
        return stored;
    }
    tracing::info!("{missing} run(s) carry no mention flag, testing captions for '{subject}'");
    let extractor = Extractor::for_subject(subject);
    stored.classify_missing(|record| extractor.classify(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_results_is_error() {
        let args = AnalyzeArgs {
            results: PathBuf::from("/nonexistent/test_results.json"),
            subject: None,
            json: false,
        };
        assert!(execute(args, None).await.is_err());
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        std::fs::write(&path, "{}").unwrap();
        let args = AnalyzeArgs {
            results: path,
            subject: Some("  ".into()),
            json: false,
        };
        let err = execute(args, None).await.unwrap_err();
        assert!(err.to_string().contains("--subject"));
    }

    #[test]
    fn test_runs_without_flag_are_classified_by_subject() {
        let stored: ResultSet = serde_json::from_str(
            r#"{"IMG_01.jpg": [
                {"caption": "Juliana na sala", "context": "sala", "keywords_subjects": "Juliana", "juliana_mentioned": true, "raw_json": "{}"},
                {"caption": "Mulher na sala", "context": "sala", "keywords_subjects": "mulher", "juliana_mentioned": false, "raw_json": "{}"},
                {"caption": "Retrato", "context": "JULIANA sorrindo", "keywords_subjects": "", "juliana_mentioned": true, "raw_json": "{}"}
            ]}"#,
        )
        .unwrap();

        let results = fill_missing_flags(stored, "juliana");
        let report = analyze_for(&results, "juliana");
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.run_count, 3);
        assert_eq!(verdict.mention_count, 2);
        assert!(!verdict.is_consistent);
        assert_eq!(report.overall_consistency_percent, 0.0);
    }

    #[test]
    fn test_saved_flags_are_kept() {
        let stored: ResultSet = serde_json::from_str(
            r#"{"a.jpg": [{"caption": "Juliana", "subject_mentioned": false}]}"#,
        )
        .unwrap();
        let results = fill_missing_flags(stored, "juliana");
        assert!(!results.records().any(|r| r.mentions_subject()));
    }

    #[tokio::test]
    async fn test_analyze_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        std::fs::write(
            &path,
            r#"{"a.jpg": [
                {"caption": "Juliana", "subject_mentioned": true},
                {"caption": "Maria", "subject_mentioned": false}
            ]}"#,
        )
        .unwrap();
        let args = AnalyzeArgs {
            results: path,
            subject: Some("maria".into()),
            json: true,
        };
        execute(args, None).await.unwrap();
    }
}
