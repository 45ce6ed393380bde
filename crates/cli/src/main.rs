use std::process::ExitCode;

use anyhow::Result;
use brokerflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) -> Result<()> {
    use brokerflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // stdout carries the JSON command payload, so logs go to stderr.
    match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    }
    .map_err(anyhow::Error::msg)
}

fn main() -> ExitCode {
    // Commands report config failures themselves; logging falls back to defaults.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    if let Err(error) = init_logging(&config) {
        eprintln!("logging could not be initialized: {error}");
    }

    brokerflow_cli::run()
}
