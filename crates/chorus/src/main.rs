//! Chorus CLI - repeat-run consistency checks for vision captioning services.
//!
//! Chorus asks a vision model to caption each test image several times and
//! reports how reliably it names a given subject.
//!
//! # Usage
//!
//! ```bash
//! # Caption every image in a folder three times and report consistency
//! chorus run ./shoot --subject juliana --runs 3
//!
//! # Analyze captions that already exist in a CSV export
//! chorus baseline ./shoot/index.csv
//!
//! # Re-analyze a saved results file
//! chorus analyze ./shoot/test_results.json
//!
//! # View configuration
//! chorus config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Chorus - repeat-run consistency checks for vision captioning services.
#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, env = "CHORUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Caption every image N times and report subject-mention consistency
    Run(cli::run::RunArgs),

    /// Analyze captions from an existing CSV export
    Baseline(cli::baseline::BaselineArgs),

    /// Re-analyze a saved results file
    Analyze(cli::analyze::AnalyzeArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Credentials may live in a .env file next to the images
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    // Commands that need the config load it again and fail properly.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default logging settings. Check your config file with `chorus config path`."
            );
            chorus_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Chorus v{}", chorus_core::VERSION);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config_path).await,
        Commands::Baseline(args) => cli::baseline::execute(args, config_path).await,
        Commands::Analyze(args) => cli::analyze::execute(args, config_path).await,
        Commands::Config(args) => cli::config::execute(args, config_path).await,
    }
}
