//! Breakwater filter daemon - entry point.
//!
//! Opens the tunnel device, starts the packet loop and, when enabled,
//! the application guard. Runs until interrupted.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use breakwater::blocklist::ListStore;
use breakwater::config::Config;
use breakwater::forward::{Forwarder, NoOpProtector};
use breakwater::guard::{GuardService, GuardTargets, NoSignalSource, SourceLadder};
use breakwater::notify::BlockNotifier;
use breakwater::overlay::{LogOverlay, Overlay};
use breakwater::status::FilterStatus;
use breakwater::tunnel::{TunDevice, TunnelFilter};

/// Spawn the guard loop if it is enabled in configuration.
fn spawn_guard(
    config: &Config,
    status: Arc<FilterStatus>,
    overlay: Arc<dyn Overlay>,
) -> Result<Option<JoinHandle<()>>> {
    if !config.guard.enabled {
        info!("Application guard disabled");
        return Ok(None);
    }

    let targets = Arc::new(GuardTargets::new(config.guard.targets_path.clone()));
    let restored = targets
        .restore()
        .context("Failed to restore guarded apps")?;
    info!("Application guard enabled, watching {restored} apps");

    // No platform foreground source is wired into this binary; the
    // guard idles until an embedder provides one.
    let sources = SourceLadder::new(&config.guard, Box::new(NoSignalSource), None);
    let service = GuardService::new(&config.guard, targets, sources, overlay, status);

    Ok(Some(tokio::spawn(async move { service.run().await })))
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    breakwater::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting breakwater DNS filter...");
    info!("Upstream resolver: {}", config.upstream.resolver);
    info!("Main blocklist: {}", config.lists.main.path.display());
    info!("Custom blocklist: {}", config.lists.custom.path.display());

    let status = Arc::new(FilterStatus::new());
    let overlay: Arc<dyn Overlay> = Arc::new(LogOverlay);
    let store = Arc::new(ListStore::new(config.lists.clone()));
    let notifier = Arc::new(BlockNotifier::new(
        Arc::clone(&status),
        Arc::clone(&overlay),
        &config.filter,
        config.guard.self_id.clone(),
    ));
    let forwarder = Arc::new(Forwarder::new(&config.upstream, Arc::new(NoOpProtector)));
    let filter = TunnelFilter::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&status),
        notifier,
        forwarder,
    );

    let (source, sink) = TunDevice::open(&config.tunnel).context("Failed to open tunnel device")?;
    info!(
        "Tunnel device up at {} (resolver {}, sentinel {})",
        config.tunnel.address, config.tunnel.resolver_address, config.tunnel.sentinel_address
    );
    filter.start(source, sink);

    let guard_handle = spawn_guard(&config, Arc::clone(&status), Arc::clone(&overlay))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Ctrl-C received, shutting down...");

    filter.stop().await;
    if let Some(handle) = guard_handle {
        handle.abort();
    }

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run().await
}
