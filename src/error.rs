//! Error types for aohttp

use thiserror::Error;

use crate::common::Address;

/// Main error type for aohttp
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Failed to bind on {addr}: {source}")]
    BindFailed {
        addr: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to dial {addr}: {source}")]
    DialFailed {
        addr: Address,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to resolve {host}: {reason}")]
    ResolveFailed { host: String, reason: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to switch protocols, got status {code} {reason}")]
    UnexpectedStatus { code: u16, reason: String },

    #[error("Timed out after {0:?} waiting for the upgrade response")]
    ReadTimeout(std::time::Duration),

    #[error("Failed to read upgrade response: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Request rejected with {status}: {reason}")]
    ValidationRejected { status: u16, reason: String },

    #[error("Relay error ({direction}): {source}")]
    RelayIo {
        direction: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Setup-time failures abort the whole process rather than one connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BindFailed { .. }
                | Error::DialFailed { .. }
                | Error::ResolveFailed { .. }
                | Error::Config(_)
        )
    }
}

/// Result type alias for aohttp
pub type Result<T> = std::result::Result<T, Error>;
