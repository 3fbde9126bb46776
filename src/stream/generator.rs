//! Periodic chunk generator behind `/stream-http`.
//!
//! Emits `Chunk N: <timestamp>\n` once per period, N starting at 1. The
//! timer loop stops on the first of:
//! - token set (client gone or shutdown) → session Cancelling → Closed
//! - safety deadline reached → response ended normally, token untouched
//!
//! Ticks are anchored at session start, the same instant the safety
//! deadline is measured from, so a 1s period with a 60s deadline yields
//! exactly 60 chunks.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::stream::session::{SessionOutcome, StreamSession};

/// Why the generator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorExit {
    Cancelled,
    SafetyDeadline,
}

pub struct StreamGenerator {
    session: Arc<StreamSession>,
    period: Duration,
    deadline: Option<Instant>,
}

impl StreamGenerator {
    pub fn new(session: Arc<StreamSession>, period: Duration) -> Self {
        Self {
            session,
            period,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn spawn(self) -> JoinHandle<GeneratorExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> GeneratorExit {
        let token = self.session.token().clone();
        let mut ticker = time::interval_at(self.session.started_at() + self.period, self.period);
        // Missed ticks fire back to back, so every tick due before the
        // deadline is emitted before the deadline branch can win.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let deadline = async {
            match self.deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break GeneratorExit::Cancelled,
                scheduled = ticker.tick() => {
                    if self.deadline.is_some_and(|at| scheduled > at) {
                        break GeneratorExit::SafetyDeadline;
                    }
                    self.emit().await;
                }
                _ = &mut deadline => break GeneratorExit::SafetyDeadline,
            }
        };

        // Timer released before the session is marked Closed.
        drop(ticker);

        match exit {
            GeneratorExit::Cancelled => {
                tracing::debug!(session_id = %self.session.id(), "Generator timer released");
                self.session.close(SessionOutcome::Cancelled);
            }
            GeneratorExit::SafetyDeadline => {
                tracing::info!(
                    session_id = %self.session.id(),
                    chunks = self.session.chunk_count(),
                    "Finished stream normally"
                );
                self.session.close(SessionOutcome::Deadline);
            }
        }
        exit
    }

    async fn emit(&self) {
        let n = self.session.next_chunk();
        let transport = self.session.transport();

        if !self.session.is_active() || self.session.token().is_set() || !transport.is_writable() {
            tracing::trace!(session_id = %self.session.id(), chunk = n, "Transport not writable, skipping chunk");
            return;
        }

        // A full body channel must not hold the timer past a cancel.
        let chunk = Bytes::from(format_chunk(n, Utc::now()));
        let written = tokio::select! {
            biased;
            _ = self.session.token().cancelled() => false,
            written = transport.write(chunk) => written,
        };
        if written {
            metrics::record_chunk(self.session.endpoint().as_str());
            tracing::debug!(session_id = %self.session.id(), chunk = n, "Server sent chunk");
        }
    }
}

/// Format one generator line: `Chunk N: 2026-10-18T12:00:00.000Z\n`.
pub fn format_chunk(n: u64, at: DateTime<Utc>) -> String {
    format!("Chunk {}: {}\n", n, at.to_rfc3339_opts(SecondsFormat::Millis, true))
}
