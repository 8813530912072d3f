//! Rehydration CLI
//!
//! Run with: `cargo run -p rehydration-server -- --help`

use clap::Parser;
use rehydration_server::{init_logging, serve, sweep, worker, Cli, Command, TelemetryConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let telemetry_config = TelemetryConfig::from_cli(&cli);
    init_logging(&telemetry_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_format = ?telemetry_config.log_format,
        "Starting rehydration"
    );

    let code: i32 = match cli.command {
        Command::Serve(config) => match serve(config).await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "server failed");
                1
            }
        },
        Command::Worker => worker::run().await,
        Command::Sweep(config) => sweep::run_once(&config).await,
    };
    std::process::exit(code);
}
