//! bugbot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bugbot")]
#[command(about = "Discord bug-report tracker with reaction-driven triage")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Also write daily rolling logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Write rolling logs into the data directory's `logs/`
    #[arg(long, conflicts_with = "log_dir")]
    log_to_data_dir: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        bugbot::config::Config::load_from_path(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        bugbot::config::Config::load().with_context(|| "failed to load configuration")?
    };

    let log_dir = match (cli.log_dir, cli.log_to_data_dir) {
        (Some(dir), _) => Some(dir),
        (None, true) => Some(config.log_dir()),
        (None, false) => None,
    };
    if let Some(dir) = &log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    let _log_guard = bugbot::logging::init_tracing(cli.debug, log_dir.as_deref());

    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    let store = Arc::new(
        bugbot::store::GuildStore::load(config.guild_config_path(), config.blocked_ids_path())
            .await,
    );

    let handler = bugbot::discord::Handler::new(store, config.tracker, reqwest::Client::new());
    let mut client = serenity::Client::builder(&config.discord_token, bugbot::discord::INTENTS)
        .event_handler(handler)
        .await
        .with_context(|| "failed to build discord client")?;

    let shard_manager = client.shard_manager.clone();

    tracing::info!("bugbot starting");

    tokio::select! {
        result = client.start() => {
            result.with_context(|| "discord client stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shard_manager.shutdown_all().await;
        }
    }

    tracing::info!("bugbot stopped");
    Ok(())
}
