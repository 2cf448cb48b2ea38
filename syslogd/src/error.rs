//! Error types for the syslog server.

use thiserror::Error;

use crate::config::Transport;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while opening, running or closing listeners.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Endpoint could not be opened.
    #[error("Failed to bind {transport} listener to {address}: {source}")]
    Bind {
        transport: Transport,
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Address string could not be parsed for the requested transport.
    #[error("Invalid {transport} address '{address}': {reason}")]
    InvalidAddress {
        transport: Transport,
        address: String,
        reason: String,
    },

    /// Accepting a stream connection failed.
    #[error("Accept error on {address}: {source}")]
    Accept {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an endpoint failed.
    #[error("Read error on {address}: {source}")]
    Read {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Closing an endpoint failed.
    #[error("Failed to close listener on {address}: {reason}")]
    Close { address: String, reason: String },

    /// Filter pattern did not compile.
    #[error("Failed to compile pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ServerError {
    /// Create a close error.
    pub fn close(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Close {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error was raised by a receive loop rather than at bind time.
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            Self::Accept { .. } | Self::Read { .. } | Self::Close { .. }
        )
    }
}
