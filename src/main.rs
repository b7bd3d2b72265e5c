//! TaskNest server binary — loads config, initializes logging, and runs
//! the gateway with its scheduler runtime.

use std::path::PathBuf;

use clap::Parser;

use tasknest_core::NestConfig;

#[derive(Parser)]
#[command(name = "tasknest", version, about = "Task scheduling and event-delivery core")]
struct Cli {
    /// Path to config.toml (defaults to ~/.tasknest/config.toml, or
    /// $TASKNEST_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NestConfig::load_from(path)?,
        None => NestConfig::load()?,
    };

    tracing::info!("🪺 tasknest v{} starting", env!("CARGO_PKG_VERSION"));
    if config.auth.tokens.is_empty() {
        tracing::warn!("⚠️ no auth tokens configured — every API request will be rejected");
    }

    tasknest_gateway::start(&config).await
}
