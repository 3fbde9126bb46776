//! Cancellation-propagating streaming core.
//!
//! # Data Flow
//! ```text
//! /stream-http:
//!     session + watcher (safety deadline)
//!     → generator timer loop → transport → WatchedBody → client
//!
//! /stream-upstream:
//!     session + watcher (armed before any upstream call)
//!     → pipeline: request → body pulls → transport → WatchedBody → client
//!
//! Client disconnect:
//!     hyper drops WatchedBody (or the handler future)
//!     → watcher.notify_closed() → token.set()
//!     → transport ended, producer leaves its select!, session Closed
//! ```
//!
//! # Design Decisions
//! - One token per session; nothing is shared across sessions
//! - Every suspension point races `token.cancelled()` with `biased` select
//! - Release paths are idempotent so duplicate close events are harmless

pub mod generator;
pub mod session;
pub mod token;
pub mod tracker;
pub mod transport;
pub mod upstream;
pub mod watcher;

pub use generator::{GeneratorExit, StreamGenerator};
pub use session::{Endpoint, SessionId, SessionOutcome, SessionState, StreamSession};
pub use token::CancelToken;
pub use tracker::SessionTracker;
pub use transport::{BodyChunk, Transport};
pub use upstream::{
    PipelineState, RelayOutcome, UpstreamClient, UpstreamError, UpstreamHead, UpstreamPipeline,
};
pub use watcher::{ConnectionWatcher, WatchedBody};
