//! Common error types for the sentry components.

use std::fmt;

/// A specialized Result type for sentry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level error type shared by the sentry crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new store error.
    pub fn store(msg: impl fmt::Display) -> Self {
        Error::Store(msg.to_string())
    }

    /// Create a new feed error.
    pub fn feed(msg: impl fmt::Display) -> Self {
        Error::Feed(msg.to_string())
    }

    /// Create a new mail error.
    pub fn mail(msg: impl fmt::Display) -> Self {
        Error::Mail(msg.to_string())
    }

    /// Create a new HTTP error.
    pub fn http(msg: impl fmt::Display) -> Self {
        Error::Http(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
