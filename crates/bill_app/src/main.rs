use std::sync::Arc;

use anyhow::{Context, Result};
use bill_app::cli::run;
use bill_app::notifier::ConsoleNotifier;
use bill_app::{AppConfig, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    run(cli, config, Arc::new(ConsoleNotifier::stdout()))
}
