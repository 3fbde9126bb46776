//! One-shot cancellation latch with synchronous listeners.
//!
//! # Contract
//! - `set()` flips Unset → Set at most once and runs every listener in
//!   registration order, exactly once
//! - `on_set()` after the flip runs the listener immediately, so a listener
//!   registered concurrently with a disconnect can never miss it
//! - `cancelled()` resolves once Set, for use at async suspension points
//!
//! The token only notifies. Releasing timers, aborting requests and ending
//! responses is the listeners' job.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Per-session cancellation signal. Cloning shares the same latch.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    set: AtomicBool,
    /// Guards both the pending list and the Unset → Set flip.
    listeners: Mutex<Vec<Listener>>,
    signal: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token. Returns `true` only for the call that performed the
    /// transition; later calls are no-ops.
    pub fn set(&self) -> bool {
        let pending = {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.inner.set.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *listeners)
        };

        // Run outside the lock so a listener may register further listeners.
        for listener in pending {
            listener();
        }
        self.inner.signal.cancel();
        true
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Register a listener, or run it right away if the token is already set.
    pub fn on_set<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut listeners = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.inner.set.load(Ordering::Acquire) {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener();
    }

    /// Wait until the token is set. Returns immediately if it already is.
    pub async fn cancelled(&self) {
        if self.is_set() {
            return;
        }
        self.inner.signal.cancelled().await;
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("set", &self.is_set())
            .finish()
    }
}
