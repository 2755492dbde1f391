use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod cli;
mod config;
mod gaps;
mod models;
mod parser;
mod retry;
mod services;

use cli::Cli;
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing. -v/-q adjust the default; RUST_LOG wins.
    let default_filter = if cli.verbose {
        "gapscan=debug"
    } else if cli.quiet {
        "gapscan=error"
    } else {
        "gapscan=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load();
    config.paths.log_paths();

    // Ctrl-C ends the scan gracefully; whatever was gathered so far is
    // still reported, flagged as partial.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current lookups...");
            signal_token.cancel();
        }
    });

    cli::run(cli, config, cancel).await
}
