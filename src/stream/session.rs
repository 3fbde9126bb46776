//! Per-request stream session and its lifecycle.
//!
//! # States
//! ```text
//! Active → Cancelling: token set (client gone or shutdown)
//! Cancelling → Closed: producer released its timer / upstream request
//! Active → Closed: natural completion, safety deadline or upstream failure
//! ```
//!
//! Once Closed the transport is ended, so no further chunk can be written.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::stream::token::CancelToken;
use crate::stream::tracker::{SessionGuard, SessionTracker};
use crate::stream::transport::Transport;

/// Global counter for session IDs; only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Which endpoint a session serves. Used as a metrics/log label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Generator,
    Upstream,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Generator => "stream-http",
            Endpoint::Upstream => "stream-upstream",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Active = 0,
    Cancelling = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Active,
            1 => SessionState::Cancelling,
            _ => SessionState::Closed,
        }
    }
}

/// How a session ended, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Deadline,
    Cancelled,
    Failed,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Deadline => "deadline",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    endpoint: Endpoint,
    started_at: Instant,
    chunks: AtomicU64,
    state: AtomicU8,
    token: CancelToken,
    transport: Transport,
    closed: CancellationToken,
    /// Released on close. Guarded together with the Closed check in `track`.
    guard: Mutex<Option<SessionGuard>>,
}

impl StreamSession {
    /// Create a session around a fresh transport.
    ///
    /// Setting the session's token moves it to Cancelling and ends the
    /// transport synchronously, before any producer gets to run again.
    pub fn new(endpoint: Endpoint, transport: Transport) -> Arc<Self> {
        let session = Arc::new_cyclic(|weak: &Weak<StreamSession>| {
            let token = CancelToken::new();
            let weak = weak.clone();
            token.on_set(move || {
                if let Some(session) = weak.upgrade() {
                    session.begin_cancel();
                }
            });

            Self {
                id: SessionId::new(),
                endpoint,
                started_at: Instant::now(),
                chunks: AtomicU64::new(0),
                state: AtomicU8::new(SessionState::Active as u8),
                token,
                transport,
                closed: CancellationToken::new(),
                guard: Mutex::new(None),
            }
        });

        metrics::record_session_started(endpoint.as_str());
        tracing::debug!(session_id = %session.id, endpoint = %endpoint, "Session opened");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Count this session as live in `tracker` until it closes. A session
    /// that already closed is not counted.
    pub fn track(&self, tracker: &SessionTracker) {
        let mut guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == SessionState::Closed || guard.is_some() {
            return;
        }
        *guard = Some(tracker.track(self.id));
    }

    /// Advance the chunk counter and return the new chunk number (1-based).
    pub fn next_chunk(&self) -> u64 {
        self.chunks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunks.load(Ordering::Acquire)
    }

    /// Active → Cancelling, ending the transport. Returns `false` if the
    /// session already left Active.
    fn begin_cancel(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Cancelling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            self.transport.end();
            tracing::debug!(session_id = %self.id, "Session cancelling");
        }
        moved
    }

    /// Move to Closed and end the transport. Safe to call more than once;
    /// only the first call counts.
    pub fn close(&self, outcome: SessionOutcome) -> bool {
        let previous = self.state.swap(SessionState::Closed as u8, Ordering::AcqRel);
        if SessionState::from_u8(previous) == SessionState::Closed {
            return false;
        }

        self.transport.end();
        self.guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.closed.cancel();
        metrics::record_session_finished(self.endpoint.as_str(), outcome.as_str());
        tracing::debug!(
            session_id = %self.id,
            outcome = outcome.as_str(),
            chunks = self.chunk_count(),
            "Session closed"
        );
        true
    }

    /// Resolves once the session reaches Closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state() != SessionState::Closed {
            self.close(SessionOutcome::Cancelled);
        }
    }
}
