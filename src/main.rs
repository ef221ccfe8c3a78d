//! Outbound request proxy service.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────────┐
//!                    │                     OUTBOUND PROXY                        │
//!                    │                                                           │
//!   API caller       │  ┌─────────┐   ┌───────────┐   ┌───────────┐              │
//!   ─────────────────┼─▶│  http   │──▶│  executor │──▶│ security  │              │
//!                    │  │ server  │   │           │   │ validator │──▶ DNS cache │
//!                    │  └─────────┘   └─────┬─────┘   └───────────┘              │
//!                    │                      │                                    │
//!                    │                      ▼                                    │
//!                    │               ┌──────────────┐   ┌──────────────┐         │
//!                    │               │  resilience  │──▶│   outbound   │─────────┼──▶ Upstream
//!                    │               │   limiter    │   │    client    │         │
//!                    │               └──────────────┘   └──────┬───────┘         │
//!                    │                                         ▼                 │
//!   ◀────────────────┼───────────────────────────────── response normalizer     │
//!                    │                                                           │
//!                    │  config · observability · lifecycle (cross-cutting)      │
//!                    └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use tokio::net::TcpListener;

use outbound_proxy::config::{load_config, load_from_env, ProxyConfig};
use outbound_proxy::lifecycle::{shutdown_signal, Shutdown};
use outbound_proxy::observability::{init_logging, init_metrics};
use outbound_proxy::HttpServer;

/// Environment variable naming an optional TOML config file.
const CONFIG_PATH_ENV: &str = "OUTBOUND_PROXY_CONFIG";

fn load() -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = match path {
        Some(path) => load_config(&path)?,
        None => load_from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load()?;
    init_logging(&config.observability);

    tracing::info!("outbound-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        timeout_ms = config.outbound.timeout_ms,
        max_inflight = config.outbound.max_inflight,
        max_sockets = config.outbound.max_sockets,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.trigger();
        });
    }

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
