//! Upstream relay behind `/stream-upstream`.
//!
//! # State Machine
//! ```text
//! Idle → RequestIssued → Streaming → Completed
//!                   ↘          ↘
//!                    Aborted (token set)   Failed (upstream error)
//! ```
//!
//! Every suspension point (the request, each body pull, the pacing delay)
//! races the session token. Dropping the in-flight request future or body
//! stream is what aborts the upstream call; reqwest closes the connection.
//!
//! The response head is committed lazily. Until the first chunk is about to
//! be written, a failure can still be answered with a `502`; after that the
//! status line is gone and the connection is cut instead.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::observability::metrics;
use crate::stream::session::{SessionOutcome, StreamSession};
use crate::stream::watcher::ConnectionWatcher;

/// Upstream failures. Client disconnects are not errors; see [`RelayOutcome::Aborted`].
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, connect timeout, ...
    #[error("upstream unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),

    /// Body read failed after the upstream started answering.
    #[error("upstream stream error: {0}")]
    Stream(#[source] reqwest::Error),
}

/// Shared handle to the upstream source.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: Url,
    pacing: Option<Duration>,
}

impl UpstreamClient {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            pacing: None,
        }
    }

    /// Delay inserted before each forwarded chunk. Demo/test knob only.
    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing.filter(|d| !d.is_zero());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// What the handler should answer with, decided by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamHead {
    /// Stream the body with `200 OK`.
    Ready,
    /// Nothing was forwarded; answer `502`.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    RequestIssued,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

#[derive(Debug)]
pub enum RelayOutcome {
    Completed,
    Aborted,
    Failed(UpstreamError),
}

impl RelayOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            RelayOutcome::Completed => PipelineState::Completed,
            RelayOutcome::Aborted => PipelineState::Aborted,
            RelayOutcome::Failed(_) => PipelineState::Failed,
        }
    }
}

pub struct UpstreamPipeline {
    upstream: UpstreamClient,
    session: Arc<StreamSession>,
    head: Option<oneshot::Sender<UpstreamHead>>,
    state: watch::Sender<PipelineState>,
}

impl UpstreamPipeline {
    /// Bind a pipeline to the session observed by `watcher`.
    ///
    /// Taking the watcher here is the ordering guarantee: the disconnect
    /// observer exists before the upstream request can be issued.
    pub fn new(
        upstream: &UpstreamClient,
        watcher: &ConnectionWatcher,
    ) -> (Self, oneshot::Receiver<UpstreamHead>) {
        debug_assert!(
            watcher.is_armed(),
            "connection watcher must be armed before the upstream request"
        );
        let (head_tx, head_rx) = oneshot::channel();
        let pipeline = Self {
            upstream: upstream.clone(),
            session: watcher.session().clone(),
            head: Some(head_tx),
            state: watch::channel(PipelineState::Idle).0,
        };
        (pipeline, head_rx)
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Follow state transitions after the pipeline has been spawned.
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<RelayOutcome> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> RelayOutcome {
        // The upstream request and body are owned by `relay`, so they are
        // released before the session is closed in `finish`.
        let outcome = self.relay().await;
        self.finish(&outcome).await;
        outcome
    }

    async fn relay(&mut self) -> RelayOutcome {
        let token = self.session.token().clone();
        if token.is_set() {
            return RelayOutcome::Aborted;
        }

        self.state.send_replace(PipelineState::RequestIssued);
        let request = self.upstream.client.get(self.upstream.url.clone()).send();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return RelayOutcome::Aborted,
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => return RelayOutcome::Failed(UpstreamError::Unavailable(e)),
        };
        let status = response.status();
        if !status.is_success() {
            return RelayOutcome::Failed(UpstreamError::Status(status));
        }

        tracing::info!(
            session_id = %self.session.id(),
            status = %status,
            "Upstream connected, relaying body"
        );
        self.state.send_replace(PipelineState::Streaming);

        let body = response.bytes_stream();
        tokio::pin!(body);

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return RelayOutcome::Aborted,
                next = body.next() => next,
            };
            let chunk = match next {
                None => return RelayOutcome::Completed,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return RelayOutcome::Failed(UpstreamError::Stream(e)),
            };
            if chunk.is_empty() {
                continue;
            }

            if !self.session.transport().is_writable() {
                return RelayOutcome::Aborted;
            }

            if let Some(delay) = self.upstream.pacing {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return RelayOutcome::Aborted,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if token.is_set() {
                return RelayOutcome::Aborted;
            }
            self.commit_head();
            let written = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                written = self.session.transport().write(chunk) => written,
            };
            if !written {
                return RelayOutcome::Aborted;
            }

            let n = self.session.next_chunk();
            metrics::record_chunk(self.session.endpoint().as_str());
            tracing::debug!(session_id = %self.session.id(), chunk = n, "Proxied chunk");
        }
    }

    async fn finish(&mut self, outcome: &RelayOutcome) {
        self.state.send_replace(outcome.state());
        let session_id = self.session.id();

        match outcome {
            RelayOutcome::Completed => {
                self.commit_head();
                self.session.close(SessionOutcome::Completed);
                tracing::info!(
                    session_id = %session_id,
                    chunks = self.session.chunk_count(),
                    "Upstream stream finished normally"
                );
            }
            RelayOutcome::Aborted => {
                self.session.close(SessionOutcome::Cancelled);
                tracing::info!(
                    session_id = %session_id,
                    chunks = self.session.chunk_count(),
                    "Aborted upstream request, client is gone"
                );
            }
            RelayOutcome::Failed(err) => {
                tracing::error!(session_id = %session_id, error = %err, "Upstream error");
                match self.head.take() {
                    Some(head) => {
                        // Close first so the handler dropping its watcher
                        // is not mistaken for a client disconnect.
                        self.session.close(SessionOutcome::Failed);
                        let _ = head.send(UpstreamHead::Failed);
                    }
                    None => {
                        self.session
                            .transport()
                            .abort(io::Error::other(err.to_string()))
                            .await;
                        self.session.close(SessionOutcome::Failed);
                    }
                }
            }
        }
    }

    fn commit_head(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(UpstreamHead::Ready);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::session::{Endpoint, SessionState};
    use crate::stream::transport::Transport;

    fn upstream() -> UpstreamClient {
        UpstreamClient::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9/stream").unwrap(),
        )
    }

    #[test]
    fn zero_pacing_disables_delay() {
        let client = upstream().with_pacing(Some(Duration::ZERO));
        assert!(client.pacing.is_none());

        let client = upstream().with_pacing(Some(Duration::from_millis(1500)));
        assert_eq!(client.pacing, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn status_error_display() {
        let err = UpstreamError::Status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "upstream returned 500 Internal Server Error");
    }

    #[tokio::test]
    async fn token_set_before_run_never_issues_request() {
        let (transport, _rx) = Transport::channel(4);
        let session = StreamSession::new(Endpoint::Upstream, transport);
        let watcher = ConnectionWatcher::arm(session.clone());
        let (pipeline, head) = UpstreamPipeline::new(&upstream(), &watcher);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        let states = pipeline.watch_state();

        watcher.notify_closed();
        let outcome = pipeline.run().await;

        assert_eq!(outcome.state(), PipelineState::Aborted);
        assert_eq!(*states.borrow(), PipelineState::Aborted);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(head.await.is_err());
    }
}
