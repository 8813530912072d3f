//! Logging setup
//!
//! Library crates log through the `log` facade; the subscriber installed
//! here forwards those records alongside the binary's own `tracing` events.

use std::env;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{Cli, LogFormat};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level: cli.log_level.clone(),
            log_format: cli.log_format,
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.log_filter.is_empty() {
            EnvFilter::new(&self.default_level)
        } else {
            EnvFilter::new(&self.log_filter)
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level: "info".to_string(),
            log_format: LogFormat::Human,
        }
    }
}

/// Initialize logging.
///
/// Safe to call multiple times - will only initialize once.
pub fn init_logging(config: &TelemetryConfig) {
    // A global subscriber may already be set (e.g., from tests)
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
        LogFormat::Human => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    // try_init also installs the log -> tracing bridge
    let _ = tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init();
}
