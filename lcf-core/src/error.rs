//! Error types for lcf-core
//!
//! Mirrors the four failure classes of the engine: configuration errors block
//! a start attempt, transport errors are retried automatically, enrichment
//! errors and malformed batches degrade silently.

use thiserror::Error;

/// Main error type for lcf-core
#[derive(Error, Debug)]
pub enum Error {
    /// Missing target or credential; fatal to the start attempt
    #[error("Configuration error: {0}")]
    Config(String),

    /// Push connection dropped or poll fetch failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Order or customer lookup failed
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Push message that is neither an array nor a data envelope
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shared library errors
    #[error(transparent)]
    Common(#[from] lcf_common::Error),
}

impl Error {
    /// Only configuration errors stop the user; everything else recovers
    pub fn is_user_blocking(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Convenience Result type using lcf-core Error
pub type Result<T> = std::result::Result<T, Error>;
