//! Logging initialization.
//!
//! All log output goes to stderr so the report on stdout stays clean enough
//! to pipe. `RUST_LOG` overrides the configured level.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// HTTP client internals are noisy at debug level.
const QUIET_TARGETS: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_TARGETS}")))
}

/// Install the global subscriber.
///
/// * `level` - Default level when `RUST_LOG` is unset
/// * `json_format` - Structured JSON lines instead of human-readable output
pub fn init(level: &str, json_format: bool) {
    let filter = filter_for(level);

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(console::user_attended_stderr()),
            )
            .init();
    }
}

/// Resolve the level and format from config plus the CLI flags.
pub fn settings(
    config: &chorus_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) -> (String, bool) {
    let level = if verbose_override {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let json_format = json_logs_override || config.logging.format == "json";
    (level, json_format)
}

/// Initialize logging from config, with CLI overrides.
pub fn init_from_config(config: &chorus_core::Config, verbose: bool, json_logs: bool) {
    let (level, json_format) = settings(config, verbose, json_logs);
    init(&level, json_format);
}
