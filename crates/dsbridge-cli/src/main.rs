//! dsbridge: bridge Devantech DS relay/switch modules to a host
//! automation bus.
//!
//! Usage:
//! ```sh
//! dsbridge [config.json]
//! ```
//!
//! With no argument the built-in defaults apply (DS/DS2824 device
//! definitions, status listener on 28241). Bus batches are written to
//! the log; embedding applications replace the sink with their own bus
//! connection.

use anyhow::{Context, Result};
use dsbridge_core::GatewayConfig;
use dsbridge_gateway::{BusMessage, Gateway};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<GatewayConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading configuration from {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {path}"))
        }
        None => {
            info!("no configuration file given, using built-in defaults");
            Ok(GatewayConfig::default())
        }
    }
}

/// Drain bus batches into the log.
fn spawn_logging_sink(mut rx: mpsc::UnboundedReceiver<BusMessage>) {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                BusMessage::Delta(values) => {
                    for value in values {
                        debug!(path = %value.path, value = %value.value, "delta");
                    }
                }
                BusMessage::Meta(metas) => {
                    for meta in metas {
                        debug!(path = %meta.path, meta = %meta.meta, "metadata");
                    }
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = load_config()?;
    let (bus, bus_rx) = mpsc::unbounded_channel();
    spawn_logging_sink(bus_rx);

    let gateway = Gateway::bind(config, bus)
        .await
        .context("starting gateway")?;
    info!(addr = %gateway.local_addr()?, "dsbridge {} started", dsbridge_core::VERSION);

    let handle = gateway.handle();
    let task = tokio::spawn(gateway.run());

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    handle.shutdown();
    task.await.context("gateway task failed")?;
    Ok(())
}
