//! Error types for the starwatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for starwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the starwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot source errors (fetching the starred listing)
    #[error("snapshot source error: {0}")]
    Source(String),

    /// State store errors
    #[error("state store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from destination APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connector-specific error
    #[error("connector error ({connector}): {message}")]
    Connector {
        /// Connector name
        connector: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a snapshot source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a connector-specific error
    pub fn connector(connector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connector {
            connector: connector.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
