//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the streaming handlers
//! - Wire up middleware (tracing, request ID)
//! - Build the upstream client
//! - Serve until shutdown, cancelling live sessions on the way out

use axum::{routing::get, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::{GeneratorConfig, ServerConfig};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::stream::{SessionTracker, UpstreamClient};

/// Errors building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream URL: {0}")]
    UpstreamUrl(#[from] url::ParseError),

    #[error("failed to build upstream client: {0}")]
    UpstreamClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub generator: GeneratorConfig,
    pub upstream: UpstreamClient,
    pub shutdown: Shutdown,
    pub sessions: SessionTracker,
}

/// HTTP server for the streaming endpoints.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let url = Url::parse(&config.upstream.url)?;
        // No overall request timeout: it would cut long streams. Only
        // connecting is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(config.upstream.connect_timeout())
            .build()?;
        let upstream = UpstreamClient::new(client, url).with_pacing(config.upstream.pacing_delay());

        let shutdown = Shutdown::new();
        let state = AppState {
            generator: config.generator.clone(),
            upstream,
            shutdown: shutdown.clone(),
            sessions: SessionTracker::new(),
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/stream-http", get(handlers::stream_http))
            .route("/stream-upstream", get(handlers::stream_upstream))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Handle used to stop the server and every live session.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
