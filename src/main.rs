//! Tracefab broker CLI

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;

use tracefab::broker::Broker;
use tracefab::config::BrokerConfig;
use tracefab::error::{Result, TracefabError};

#[derive(Parser)]
#[command(name = "tracefab")]
#[command(about = "Tracefab broker - routes, persists, and re-broadcasts log/trace events")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file (default: tracefab.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(long, value_name = "N")]
    port: Option<u16>,

    /// Write a default config file and exit
    #[arg(long)]
    create_config: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("tracefab.json"));

    if cli.create_config {
        let config = BrokerConfig::default();
        config.save(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    let mut config = match BrokerConfig::load(&config_path) {
        Ok(config) => config,
        Err(TracefabError::ConfigNotFound { .. }) => {
            tracing::info!(path = %config_path.display(), "No config file, using defaults");
            BrokerConfig::default()
        }
        Err(err) => return Err(err),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    let broker = Broker::bind(config).await?;
    let handle = broker.handle();
    tracing::info!(addr = %broker.local_addr()?, "Broker listening");

    tokio::select! {
        res = broker.run() => res,
        _ = tokio::signal::ctrl_c() => {
            let snap = handle.stats();
            tracing::info!(
                links = snap.links,
                messages = snap.messages,
                "Shutting down, draining link table"
            );
            handle.shutdown();
            Ok(())
        }
    }
}
