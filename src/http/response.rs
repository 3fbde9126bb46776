//! Response construction for the streaming endpoints.
//!
//! # Design Decisions
//! - Streaming responses never buffer; the body is the session's WatchedBody
//! - No Content-Length, so hyper uses chunked transfer on HTTP/1.1
//! - Upstream failures before the first byte map to 502 with a JSON body

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::stream::WatchedBody;

/// `/stream-http` response: plain text, uncached, kept alive.
pub fn generator_stream(body: WatchedBody) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// `/stream-upstream` response once the upstream produced its first chunk.
pub fn upstream_stream(body: WatchedBody) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from_stream(body),
    )
        .into_response()
}

/// Upstream failed before anything was forwarded.
pub fn upstream_failed() -> Response {
    (StatusCode::BAD_GATEWAY, Json(json!({ "error": "Upstream failed" }))).into_response()
}

/// The relay was stopped (shutdown) before it committed a response.
pub fn stream_cancelled() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "Stream cancelled").into_response()
}
