//! MongoDB session CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mongosession_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration, flags taking precedence
    let config = AppConfig::resolve(&cli).context("failed to load configuration")?;

    // Initialize logging
    setup_logging(config.verbose);

    CommandDispatcher::execute(cli.command, config).await?;

    info!("mongosession exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level. `RUST_LOG` wins when set.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
