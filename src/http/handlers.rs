//! Endpoint handlers.
//!
//! Both streaming handlers follow the same order: tracked session, shutdown link,
//! connection watcher, then the producer. The watcher is armed before any
//! producer exists, so no suspension point can run without an observer.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Json,
};
use serde::Serialize;

use crate::http::request::request_id;
use crate::http::response;
use crate::http::server::AppState;
use crate::stream::{
    ConnectionWatcher, Endpoint, StreamGenerator, StreamSession, Transport, UpstreamHead,
    UpstreamPipeline,
};

/// Chunks buffered between a producer and the response body.
const BODY_BUFFER: usize = 16;

#[derive(Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_sessions: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
        active_sessions: state.sessions.active_count(),
    })
}

/// `GET /stream-http`: one `Chunk N: <timestamp>` line per tick until the
/// client leaves or the safety deadline passes.
pub async fn stream_http(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (transport, receiver) = Transport::channel(BODY_BUFFER);
    let session = StreamSession::new(Endpoint::Generator, transport);
    tracing::info!(
        request_id = %request_id(&request),
        session_id = %session.id(),
        "New stream connection initiated"
    );
    session.track(&state.sessions);
    state.shutdown.link(&session);

    let watcher = ConnectionWatcher::arm(session.clone())
        .with_safety_deadline(state.generator.safety_deadline());
    StreamGenerator::new(session, state.generator.tick_interval())
        .with_deadline(watcher.safety_deadline())
        .spawn();

    response::generator_stream(watcher.into_body(receiver))
}

/// `GET /stream-upstream`: relay the upstream body, aborting the upstream
/// request as soon as the client goes away.
pub async fn stream_upstream(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (transport, receiver) = Transport::channel(BODY_BUFFER);
    let session = StreamSession::new(Endpoint::Upstream, transport);
    tracing::info!(
        request_id = %request_id(&request),
        session_id = %session.id(),
        upstream = %state.upstream.url(),
        "New upstream stream connection initiated"
    );
    session.track(&state.sessions);
    state.shutdown.link(&session);

    // Armed before the request goes out. If hyper drops this future while
    // the upstream call is pending, the watcher's drop sets the token.
    let watcher = ConnectionWatcher::arm(session);
    let (pipeline, head) = UpstreamPipeline::new(&state.upstream, &watcher);
    pipeline.spawn();

    match head.await {
        Ok(UpstreamHead::Ready) => response::upstream_stream(watcher.into_body(receiver)),
        Ok(UpstreamHead::Failed) => response::upstream_failed(),
        Err(_) => response::stream_cancelled(),
    }
}
