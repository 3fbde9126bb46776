//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!
//! Shutdown (shutdown.rs):
//!     trigger → linked session tokens set → producers stop
//!     → bodies end → axum drains connections → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
