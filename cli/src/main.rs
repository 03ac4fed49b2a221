//! Anvil binary entry point.
//!
//! Startup order: load and validate config, initialize tracing (stderr -
//! stdout belongs to the JSON-RPC stream), start the config watcher when a
//! config file is present, build the workspace, then serve stdio until
//! stdin closes, a signal arrives, or the idle timeout fires.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use anvil_config::{AnvilConfig, ConfigWatcher};
use anvil_server::Server;
use anvil_workspace::LocalWorkspace;

fn init_tracing(configured_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol; everything observable goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = AnvilConfig::load().context("failed to load configuration")?;
    init_tracing(&config.log.level);

    match &source {
        Some(path) => tracing::info!(path = %path.display(), "loaded config from file"),
        None => tracing::info!("no config file found, using defaults"),
    }

    // Hot reload only makes sense when there is a file to watch; without
    // one the channel simply never changes.
    let (watcher, config_rx) = match source {
        Some(path) => match ConfigWatcher::spawn(config.clone(), &path) {
            Ok((watcher, rx)) => (Some(watcher), rx),
            Err(e) => {
                tracing::warn!("config hot reload disabled: {e}");
                (None, fixed_config_channel(config.clone()))
            }
        },
        None => (None, fixed_config_channel(config.clone())),
    };

    let workspace = Arc::new(LocalWorkspace::new(config_rx.clone()));
    let server = Server::new(workspace, config_rx);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    server
        .run_stdio(shutdown)
        .await
        .context("server terminated abnormally")?;

    drop(watcher);
    tracing::info!("bye");
    Ok(())
}

/// A receiver keeps serving the last snapshot after its sender drops, which
/// is exactly what a config without a backing file needs.
fn fixed_config_channel(
    config: AnvilConfig,
) -> tokio::sync::watch::Receiver<AnvilConfig> {
    let (_tx, rx) = tokio::sync::watch::channel(config);
    rx
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {e}");
                    if ctrl_c.await.is_ok() {
                        shutdown.cancel();
                    }
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("signal received, shutting down");
        shutdown.cancel();
    });
}
