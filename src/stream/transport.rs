//! Downstream writer feeding a chunked response body.
//!
//! The producer side holds a [`Transport`]; the HTTP layer consumes the
//! matching receiver through a [`WatchedBody`](super::watcher::WatchedBody).
//! Ending the transport drops the sender, which completes the body cleanly.
//! Aborting pushes an error item, which makes hyper drop the connection
//! without the terminating zero-length chunk.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use axum::body::Bytes;
use tokio::sync::mpsc;

/// Item type of the response body channel.
pub type BodyChunk = Result<Bytes, io::Error>;

#[derive(Debug)]
pub struct Transport {
    sender: Mutex<Option<mpsc::Sender<BodyChunk>>>,
    ended: AtomicBool,
}

impl Transport {
    /// Create a transport and the receiver the response body will drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BodyChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        let transport = Self {
            sender: Mutex::new(Some(tx)),
            ended: AtomicBool::new(false),
        };
        (transport, rx)
    }

    /// True while the response is not ended and the body is still attached.
    pub fn is_writable(&self) -> bool {
        if self.ended.load(Ordering::Acquire) {
            return false;
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Write one chunk. Returns `false` if the transport was ended or the
    /// body was dropped before the chunk could be queued.
    pub async fn write(&self, chunk: Bytes) -> bool {
        let tx = {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            if self.ended.load(Ordering::Acquire) {
                return false;
            }
            match sender.as_ref() {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };
        tx.send(Ok(chunk)).await.is_ok()
    }

    /// End the response normally. Idempotent.
    pub fn end(&self) -> bool {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        sender.take();
        true
    }

    /// Terminate the response with an error so the connection closes without
    /// a clean chunked trailer. No-op if already ended.
    pub async fn abort(&self, error: io::Error) -> bool {
        let tx = {
            let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            if self.ended.swap(true, Ordering::AcqRel) {
                return false;
            }
            sender.take()
        };
        match tx {
            Some(tx) => tx.send(Err(error)).await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_end() {
        let (transport, mut rx) = Transport::channel(4);
        assert!(transport.is_writable());
        assert!(transport.write(Bytes::from_static(b"a")).await);

        assert!(transport.end());
        assert!(!transport.end());
        assert!(!transport.is_writable());
        assert!(!transport.write(Bytes::from_static(b"b")).await);

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_is_not_writable() {
        let (transport, rx) = Transport::channel(4);
        drop(rx);
        assert!(!transport.is_writable());
        assert!(!transport.write(Bytes::from_static(b"a")).await);
        assert!(!transport.is_ended());
    }

    #[tokio::test]
    async fn abort_delivers_error_once() {
        let (transport, mut rx) = Transport::channel(4);
        assert!(transport.abort(io::Error::other("boom")).await);
        assert!(!transport.abort(io::Error::other("again")).await);
        assert!(!transport.end());

        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());
    }
}
