//! # mdr-runner
//!
//! Market-data relay entry point.
//!
//! Loads a JSON configuration file, starts the fan-out server, opens the
//! upstream feeds for every configured symbol (see [`feeds`]) and bridges the
//! normalized events into rooms.
//!
//! # Usage
//!
//! ```bash
//! RELAY_ENV=production mdr-runner config.json --log-level info
//! ```

mod bridge;
mod feeds;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mdr_core::config::AppConfig;
use mdr_fanout::server::{self, FanoutState};
use mdr_feed::Connector;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::bridge::Bridge;
use crate::feeds::RelayFeeds;

/// Market-data relay: upstream exchange feeds fanned out to browser rooms.
#[derive(Parser)]
#[command(name = "mdr-runner", about = "Market-data relay")]
struct Cli {
    /// Configuration file path (JSON). Defaults apply when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = match &cli.config {
        Some(path) => mdr_core::config::load_config(path)?,
        None => AppConfig::default(),
    };

    // 2. Initialize logging
    let module_name = config.relay.module_name();
    let log_dir = cli.log_dir.clone().or_else(|| config.relay.log_path.clone());
    mdr_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &module_name);

    info!(
        "{module_name} starting, config={}, symbols={:?}",
        cli.config.as_ref().map_or("<defaults>".to_string(), |p| p.display().to_string()),
        config.feed.symbols
    );

    // 3. Fan-out server
    let (hub, hub_task) = mdr_fanout::spawn_hub();
    let listener = server::bind(config.fanout.port_from_env()).await?;
    let state = FanoutState::new(hub.clone(), &config.fanout);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    // 4. Upstream feeds
    let bridge = Bridge::new(hub);
    let mut connector = Connector::from_feed_config(&config.feed);
    let mut feeds = RelayFeeds::open(&mut connector, &bridge, &config.feed.symbols);
    info!("{} feed(s) running, press Ctrl+C to stop", feeds.len());

    // 5. Revive abandoned bundles until the shutdown signal
    let mut revive = tokio::time::interval(config.feed.revive_interval());
    revive.tick().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                break;
            }
            _ = revive.tick() => {
                let n = feeds.revive(&mut connector, &bridge);
                if n > 0 {
                    info!("reopened {n} feed(s)");
                }
            }
        }
    }
    info!("shutdown signal received");

    // 6. Tear down: feeds first, then the server, then the hub
    connector.shutdown().await;
    let _ = stop_tx.send(());
    match server_task.await {
        Ok(Err(e)) => error!("fan-out server error: {e:#}"),
        Err(e) => error!("fan-out server task failed: {e}"),
        Ok(Ok(())) => {}
    }
    // Upgraded browser sockets may still hold hub handles.
    hub_task.abort();

    info!("relay stopped");
    Ok(())
}
