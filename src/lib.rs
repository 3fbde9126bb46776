//! Chunked HTTP streaming that stops the moment the client disconnects.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod stream;

pub use config::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
