//! The `chorus baseline` command: analyze captions from an existing CSV.

use chorus_core::analysis::analyze_for;
use chorus_core::baseline::load_baseline;
use chorus_core::{save_results, Extractor, OutputFormat};
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the `baseline` command.
#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// CSV file with one row per captioning attempt
    pub csv: PathBuf,

    /// Subject name to look for in the captions
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Also save the grouped records as a results file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the baseline command.
pub async fn execute(args: BaselineArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(subject) = &args.subject {
        config.consistency.subject = subject.clone();
    }
    config.check()?;

    let csv = super::expand_path(&args.csv);
    if !csv.is_file() {
        anyhow::bail!("Baseline file does not exist: {:?}", csv);
    }

    let extractor = Extractor::for_subject(&config.consistency.subject);
    let results = load_baseline(&csv, &config.baseline, &extractor)?;
    tracing::info!(
        "Baseline: {} records across {} image(s)",
        results.records().count(),
        results.len()
    );

    if let Some(output) = &args.output {
        let path = super::expand_path(output);
        let format = OutputFormat::parse(&config.output.format).unwrap_or(OutputFormat::Json);
        save_results(&path, &results, format, config.output.pretty)?;
    }

    let report = analyze_for(&results, &config.consistency.subject);
    super::print_report(&report, &results, config.output.excerpt_chars, args.json)
}
