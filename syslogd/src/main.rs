//! Syslog receiver daemon.
//!
//! Loads a JSON5 configuration, starts the configured listeners and writes
//! accepted messages to the configured output until Ctrl+C.

use anyhow::{Context, Result};
use tokio::signal;

use syslogd::{Args, ChannelSink, DaemonConfig, Server};
use syslogd_common::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = DaemonConfig::load_from_file(&args.config)?;

    let log_config = match &args.log_level {
        Some(level) => config.logging.with_level(level.clone()),
        None => config.logging.clone(),
    };
    init_tracing(&log_config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting syslogd"
    );

    let mut server = Server::from_config(&config.server)?;
    let (sink, mut fatal) = ChannelSink::new();
    server.set_fatal_sink(sink);

    if let Err(e) = server.listen_all(&config.server.listeners).await {
        server.shutdown().await;
        return Err(e).context("Failed to start syslog listeners");
    }

    tracing::info!(
        listeners = server.listener_count(),
        "syslogd running. Press Ctrl+C to stop."
    );

    let failure = tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Received shutdown signal");
            None
        }
        Some(error) = fatal.recv() => Some(error),
    };

    server.shutdown().await;

    // Close failures reported during shutdown.
    while let Ok(error) = fatal.try_recv() {
        tracing::error!(error = %error, "Error while stopping listener");
    }

    match failure {
        Some(error) => Err(error).context("Syslog listener failed"),
        None => Ok(()),
    }
}
