//! CLI command implementations.

pub mod analyze;
pub mod baseline;
pub mod config;
pub mod run;
pub mod types;

use chorus_core::report::format_report;
use chorus_core::{AggregateReport, Config, ConfigError, ResultSet};
use console::style;
use std::path::{Path, PathBuf};

/// Expand `~` in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// The config file in effect: `--config` when given, else the platform default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(expand_path).unwrap_or_else(Config::default_path)
}

/// Load config from `--config` or the default location.
///
/// An explicit path must exist; the default one falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) => Config::load_from(&expand_path(path)),
        None => Config::load(),
    }
}

/// Print a report to stdout, as styled text or as JSON.
pub fn print_report(
    report: &AggregateReport,
    results: &ResultSet,
    excerpt_chars: usize,
    json: bool,
) -> anyhow::Result<()> {
    let formatted = format_report(report, results, excerpt_chars);
    if json {
        println!("{}", serde_json::to_string_pretty(&formatted.structured)?);
    } else {
        for line in formatted.human_text.lines() {
            println!("{}", highlight(line));
        }
    }
    Ok(())
}

fn highlight(line: &str) -> String {
    if line.contains("[OK] CONSISTENT") {
        style(line).green().to_string()
    } else if line.contains("[!!] INCONSISTENT") {
        style(line).red().to_string()
    } else if line.contains("[--] NO RUNS") {
        style(line).yellow().to_string()
    } else if line.starts_with("OVERALL CONSISTENCY") {
        style(line).bold().to_string()
    } else {
        line.to_string()
    }
}
