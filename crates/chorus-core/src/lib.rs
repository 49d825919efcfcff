//! Chorus Core - repeat-run consistency testing for vision captioning.
//!
//! Chorus sends the same captioning request for every image several times
//! and measures whether the service names a given subject reliably. An image
//! is consistent when every run agrees: all mention the subject, or none do.
//!
//! # Architecture
//!
//! Live runs and pre-existing baselines converge on one analyzer:
//!
//! ```text
//! Images → Collector (N runs each) ─┐
//!                                   ├→ ResultSet → Analyzer → Report
//! Baseline CSV / results file ──────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use chorus_core::{analysis, report, Config, ConsistencyTest};
//!
//! #[tokio::main]
//! async fn main() -> chorus_core::Result<()> {
//!     let config = Config::load()?;
//!     let test = ConsistencyTest::new(config, None)?;
//!
//!     let images = test.discover();
//!     let results = test.run(&images, |_| {}).await;
//!     let summary = analysis::analyze_for(&results, test.subject());
//!     println!("{}", report::format_report(&summary, &results, 100).human_text);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod analysis;
pub mod baseline;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ChorusError, ConfigError, Result, RunError, RunResult};
pub use llm::{LlmProvider, LlmProviderFactory};
pub use output::{load_results, save_results, OutputFormat, OutputWriter};
pub use pipeline::{AttemptEvent, AttemptOutcome, CollectOptions, Collector, Extractor};
pub use types::{
    AggregateReport, ConsistencyVerdict, ImageRef, ImageResultGroup, Record, ResultSet,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A configured consistency test: provider, prompt and classifier resolved
/// from one [`Config`].
///
/// Construction does every fallible setup step (validation, credentials,
/// prompt and session files), so a test that exists can run.
pub struct ConsistencyTest {
    config: Config,
    collector: Collector,
}

impl ConsistencyTest {
    /// Build from config, creating the provider named in `llm.provider`.
    pub fn new(config: Config, model_override: Option<&str>) -> Result<Self> {
        config.check()?;
        let provider =
            LlmProviderFactory::create(&config.llm.provider, &config.llm, model_override)?;
        Self::with_provider(config, provider)
    }

    /// Build around an already-constructed provider.
    pub fn with_provider(config: Config, provider: Box<dyn LlmProvider>) -> Result<Self> {
        config.check()?;
        let prompt = prompt::build_prompt(&config)?;
        let extractor = Extractor::for_subject(&config.consistency.subject);
        let collector = Collector::new(
            provider,
            extractor,
            prompt,
            CollectOptions::from_config(&config),
        );
        tracing::debug!(
            "Chorus v{} ready: provider={}, subject={}, runs={}",
            VERSION,
            collector.provider_name(),
            config.consistency.subject,
            config.consistency.repeat_count
        );
        Ok(Self { config, collector })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subject(&self) -> &str {
        &self.config.consistency.subject
    }

    pub fn provider_name(&self) -> &str {
        self.collector.provider_name()
    }

    /// Whether the provider answers at all (a quick ping for local
    /// providers, a credential check for hosted ones).
    pub async fn provider_available(&self) -> bool {
        self.collector.provider_available().await
    }

    /// Images in the configured input folder.
    pub fn discover(&self) -> Vec<ImageRef> {
        pipeline::FileDiscovery::new(self.config.input.clone(), &self.config.limits)
            .discover(&self.config.input_dir())
    }

    /// Collect `repeat_count` records for every image.
    pub async fn run<F>(&self, images: &[ImageRef], on_attempt: F) -> ResultSet
    where
        F: FnMut(AttemptEvent<'_>),
    {
        self.collector.collect(images, on_attempt).await
    }
}
