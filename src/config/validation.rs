//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, deadline covers a tick)
//! - Check addresses and the upstream URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("generator.tick_interval_ms must be greater than 0")]
    ZeroTickInterval,

    #[error("generator.safety_deadline_ms ({deadline_ms}) is shorter than one tick ({tick_ms})")]
    DeadlineShorterThanTick { deadline_ms: u64, tick_ms: u64 },

    #[error("upstream.url '{0}' is not a valid http(s) URL")]
    InvalidUpstreamUrl(String),

    #[error("upstream.connect_timeout_ms must be greater than 0")]
    ZeroConnectTimeout,
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let generator = &config.generator;
    if generator.tick_interval_ms == 0 {
        errors.push(ValidationError::ZeroTickInterval);
    } else if generator.safety_deadline_ms < generator.tick_interval_ms {
        errors.push(ValidationError::DeadlineShorterThanTick {
            deadline_ms: generator.safety_deadline_ms,
            tick_ms: generator.tick_interval_ms,
        });
    }

    match Url::parse(&config.upstream.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidUpstreamUrl(config.upstream.url.clone())),
    }
    if config.upstream.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
