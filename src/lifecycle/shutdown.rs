//! Shutdown coordination for the server.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::stream::session::StreamSession;

/// Coordinator for graceful shutdown.
///
/// Cloning shares the same signal. Live sessions are linked to it so that a
/// shutdown stops their producers the same way a client disconnect does.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Set the session's token on shutdown. The link task ends as soon as
    /// either the session closes or shutdown fires.
    pub fn link(&self, session: &Arc<StreamSession>) {
        let shutdown = self.token.clone();
        let session = session.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = session.closed() => {}
                _ = shutdown.cancelled() => {
                    if session.token().set() {
                        tracing::debug!(session_id = %session.id(), "Session cancelled by shutdown");
                    }
                }
            }
        });
    }
}
