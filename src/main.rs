//! Tidepool server binary.

use std::path::PathBuf;

use clap::Parser;

use tidepool::config::loader::load_config;
use tidepool::lifecycle::startup;
use tidepool::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Transaction-aware connection pooler", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tidepool.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tidepool starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        targets = config.targets.len(),
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    startup::run(config, Some(args.config)).await?;
    Ok(())
}
