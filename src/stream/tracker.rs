//! Live session accounting.
//!
//! A session counts as live from the moment it is tracked until it reaches
//! Closed. The count is what `/health` reports and what tests poll to see a
//! producer released after a disconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::stream::session::SessionId;

/// Tracks sessions that have not yet closed.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active_count: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live session. Returns a guard that decrements on drop.
    pub(crate) fn track(&self, id: SessionId) -> SessionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Held by a session until it closes.
#[derive(Debug)]
pub(crate) struct SessionGuard {
    active_count: Arc<AtomicU64>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(session_id = %self.id, "Session untracked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track(SessionId::new());
        let guard2 = tracker.clone().track(SessionId::new());
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }
}
