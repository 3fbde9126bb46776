//! Connection watcher: turns a downstream disconnect into a token set.
//!
//! The watcher is armed as soon as a session exists and travels with the
//! request: first inside the handler future, then inside the response body.
//! Hyper drops whichever of the two it holds when the client goes away, and
//! that drop is the "closed" event.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::stream::session::{SessionState, StreamSession};
use crate::stream::transport::BodyChunk;

#[derive(Debug)]
pub struct ConnectionWatcher {
    session: Arc<StreamSession>,
    fired: AtomicBool,
    safety_deadline: Option<Instant>,
}

impl ConnectionWatcher {
    /// Attach the disconnect observer to a session.
    pub fn arm(session: Arc<StreamSession>) -> Self {
        tracing::trace!(session_id = %session.id(), "Connection watcher armed");
        Self {
            session,
            fired: AtomicBool::new(false),
            safety_deadline: None,
        }
    }

    /// Bound the stream's lifetime, measured from session start.
    pub fn with_safety_deadline(mut self, limit: Duration) -> Self {
        self.safety_deadline = Some(self.session.started_at() + limit);
        self
    }

    pub fn safety_deadline(&self) -> Option<Instant> {
        self.safety_deadline
    }

    pub fn session(&self) -> &Arc<StreamSession> {
        &self.session
    }

    /// True until the closed event has been observed.
    pub fn is_armed(&self) -> bool {
        !self.fired.load(Ordering::Acquire)
    }

    /// Report that the downstream connection closed.
    ///
    /// Sets the session token unless the session already finished on its
    /// own. Returns `true` only when this call set the token.
    pub fn notify_closed(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.session.state() == SessionState::Closed {
            return false;
        }

        let chunks = self.session.chunk_count();
        tracing::info!(
            session_id = %self.session.id(),
            endpoint = %self.session.endpoint(),
            chunks,
            "Client connection closed, stopping stream after {} chunks",
            chunks
        );
        self.session.token().set()
    }

    /// Hand the watcher to the response body it observes.
    pub fn into_body(self, receiver: mpsc::Receiver<BodyChunk>) -> WatchedBody {
        WatchedBody {
            receiver,
            watcher: self,
        }
    }
}

impl Drop for ConnectionWatcher {
    fn drop(&mut self) {
        self.notify_closed();
    }
}

/// Response body stream that reports a disconnect when dropped early.
#[derive(Debug)]
pub struct WatchedBody {
    receiver: mpsc::Receiver<BodyChunk>,
    watcher: ConnectionWatcher,
}

impl Stream for WatchedBody {
    type Item = BodyChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
