//! The `chorus run` command: live repeat-run collection.

use chorus_core::analysis::analyze_for;
use chorus_core::{
    save_results, AttemptEvent, AttemptOutcome, Config, ConsistencyTest, OutputFormat,
};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::types::Provider;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Folder with the test images (defaults to `input.folder` from config)
    pub folder: Option<PathBuf>,

    /// Subject name to look for in the captions
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Attempts per image
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub runs: Option<u32>,

    /// Vision provider
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Model name (provider-specific)
    #[arg(long)]
    pub model: Option<String>,

    /// Results file (relative paths land in the image folder)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip the pauses between attempts and between images
    #[arg(long)]
    pub no_delay: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Fold CLI flags into the loaded config.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(folder) = &args.folder {
        config.input.folder = super::expand_path(folder).to_string_lossy().into_owned();
    }
    if let Some(subject) = &args.subject {
        config.consistency.subject = subject.clone();
    }
    if let Some(runs) = args.runs {
        config.consistency.repeat_count = runs;
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider.to_string();
    }
    if let Some(output) = &args.output {
        config.output.results_file = super::expand_path(output).to_string_lossy().into_owned();
    }
    if args.no_delay {
        config.consistency.attempt_delay_ms = 0;
        config.consistency.image_delay_ms = 0;
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, &args);

    let folder = config.input_dir();
    if !folder.is_dir() {
        anyhow::bail!(
            "Image folder does not exist: {:?}\n\n  Hint: Pass the folder as `chorus run <FOLDER>`.",
            folder
        );
    }

    // Credentials and prompt files are checked here, before any image is sent.
    let test = ConsistencyTest::new(config, args.model.as_deref())?;
    let config = test.config();

    if !test.provider_available().await {
        anyhow::bail!(
            "Provider '{}' is not available\n\n  Hint: For ollama, start the server with `ollama serve`; \
             hosted providers need an API key in config or .env.",
            test.provider_name()
        );
    }

    let images = test.discover();
    if images.is_empty() {
        tracing::warn!("No supported image files found in {:?}", folder);
    } else {
        tracing::info!("Found {} image(s) to test", images.len());
    }

    print_header(config, test.provider_name(), &folder);

    let repeat_count = config.consistency.repeat_count;
    let pb = create_progress_bar(images.len() as u64 * repeat_count as u64);
    let start = Instant::now();

    let results = test
        .run(&images, |event| {
            pb.set_message(event.image.image_id.clone());
            pb.println(attempt_line(&event));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();
    tracing::info!("Collection finished in {:.1}s", start.elapsed().as_secs_f64());

    let results_path = config.results_path();
    let format = OutputFormat::parse(&config.output.format).unwrap_or(OutputFormat::Json);
    save_results(&results_path, &results, format, config.output.pretty)?;

    let report = analyze_for(&results, test.subject());
    super::print_report(&report, &results, config.output.excerpt_chars, args.json)?;
    if !args.json {
        println!();
        println!("Detailed results saved to: {}", results_path.display());
    }

    Ok(())
}

fn print_header(config: &Config, provider: &str, folder: &Path) {
    let rule = "=".repeat(80);
    eprintln!("{rule}");
    eprintln!("CONSISTENCY TEST");
    eprintln!("{rule}");
    eprintln!("Image folder:   {}", folder.display());
    eprintln!("Subject:        {}", config.consistency.subject);
    eprintln!("Runs per image: {}", config.consistency.repeat_count);
    eprintln!("Provider:       {provider}");
    eprintln!("{rule}");
}

/// One progress line per attempt.
fn attempt_line(event: &AttemptEvent<'_>) -> String {
    let prefix = format!(
        "  {} run {}/{}",
        event.image.image_id, event.run_index, event.repeat_count
    );
    match &event.outcome {
        AttemptOutcome::Mentioned => format!("{prefix} {}", style("✓ subject mentioned").green()),
        AttemptOutcome::NotMentioned => {
            format!("{prefix} {}", style("✗ subject not mentioned").red())
        }
        AttemptOutcome::Failed(error) => {
            format!("{prefix} {} {error}", style("⚠ error:").yellow())
        }
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let template = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}");
    match template {
        Ok(style) => pb.set_style(style.progress_chars("##-")),
        Err(e) => tracing::debug!("Progress template rejected: {e}"),
    }
    pb.set_message("starting...");
    pb
}
