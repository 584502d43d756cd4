use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dusk_connector::config::{NodeConfig, NodeMode};
use dusk_connector::{node, ShutdownHandle};

/// Dusk - turn-based social deduction over JSON-RPC.
#[derive(Parser, Debug)]
#[command(name = "dusk-connector", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured mode.
    #[arg(long, value_enum)]
    mode: Option<NodeMode>,

    /// Override the configured node name.
    #[arg(long)]
    name: Option<String>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,

    /// Override the random seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = NodeConfig::load_or_default(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(name) = cli.name {
        config.name = name.into();
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if cli.seed.is_some() {
        config.game.seed = cli.seed;
    }

    let shutdown = ShutdownHandle::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received");
                shutdown.trigger();
            }
        });
    }

    if let Some(outcome) = node::run(config, shutdown).await? {
        println!("{} wins after {} round(s)", outcome.winner, outcome.rounds);
    }
    Ok(())
}
