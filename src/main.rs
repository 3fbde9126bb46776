//! stream-relay
//!
//! Serves two long-lived chunked endpoints built with Tokio and Axum, both
//! of which stop producing the moment the client disconnects.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 STREAM RELAY                 │
//!   GET /stream-http      │  ┌─────────┐   ┌───────────┐   ┌──────────┐  │
//!  ───────────────────────┼─▶│ handler │──▶│ generator │──▶│transport │  │
//!                         │  └────┬────┘   └─────▲─────┘   └────┬─────┘  │
//!                         │       │ arm          │ token        │        │
//!                         │  ┌────▼────┐   ┌─────┴─────┐   ┌────▼─────┐  │
//!  ◀──────────────────────┼──│ watched │◀──│  watcher  │   │ channel  │  │
//!     chunked body        │  │  body   │   └───────────┘   └──────────┘  │
//!                         │  └─────────┘                                 │
//!   GET /stream-upstream  │  ┌─────────┐   ┌───────────┐                 │  Upstream
//!  ───────────────────────┼─▶│ handler │──▶│ pipeline  │◀────────────────┼── chunked
//!                         │  └─────────┘   └───────────┘  abort on token │  source
//!                         └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use stream_relay::config::{load_config, validate_config, ConfigError, ServerConfig};
use stream_relay::lifecycle::signals;
use stream_relay::observability::{logging, metrics};
use stream_relay::HttpServer;

#[derive(Parser)]
#[command(name = "stream-relay")]
#[command(about = "Chunked streaming server with disconnect-driven cancellation", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override upstream.url.
    #[arg(short, long)]
    upstream_url: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(url) = &self.upstream_url {
            config.upstream.url = url.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability);
    tracing::info!("stream-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tick_interval_ms = config.generator.tick_interval_ms,
        safety_deadline_ms = config.generator.safety_deadline_ms,
        upstream = %config.upstream.url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
