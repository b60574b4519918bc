//! Person Sync CLI

use anyhow::Context;
use clap::Parser;
use person_store::{record_store_from_config, search_index_from_config};
use person_sync::{run_server, AppState, SyncGateway};
use person_sync_core::SyncConfig;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "person-sync")]
#[command(about = "Person records over a primary store mirrored into a search index")]
#[command(version)]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long, env = "PERSON_SYNC_CONFIG")]
    config: Option<String>,

    /// Override `server.listen`
    #[arg(long, env = "LISTEN")]
    listen: Option<String>,

    /// Override `observability.log_level`
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "pretty" {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SyncConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    init_tracing(&config.observability.log_level, &config.observability.log_format);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        record_store = ?config.record_store.kind,
        search = ?config.search.backend,
        "Starting person-sync"
    );

    let records = record_store_from_config(&config.record_store);
    let index = search_index_from_config(&config.search)?;
    let gateway = Arc::new(SyncGateway::new(records, index));
    gateway.start().await?;

    let state = AppState::new(gateway.clone(), &config)?;
    let served = run_server(&config.server.listen, state, shutdown_signal()).await;

    if let Err(e) = gateway.stop().await {
        error!(error = %e, "Failed to stop stores cleanly");
    }
    served.context("HTTP server failed")?;

    info!("person-sync stopped gracefully");
    Ok(())
}
