//! Upgrade Protocol Layer
//!
//! Responsibilities:
//! - Encode/decode the HTTP/1.1 upgrade request and response
//! - Drive the initiator side (send request, await 101)
//! - Drive the acceptor side (read request, validate, answer)
//!
//! Once a handshake succeeds the connection carries opaque bytes; nothing in
//! this layer looks at them.

pub mod codec;
mod client;
mod server;

pub use client::{InitiatorHandshake, InitiatorState, DEFAULT_RESPONSE_TIMEOUT, MAX_RESPONSE_HEAD};
pub use codec::{Status, StatusLine, UpgradeRequest};
pub use server::{validate, AcceptorHandshake, AcceptorState, Rejection};

use std::time::Duration;

/// Default request path on both sides
pub const DEFAULT_PATH: &str = "/aohttp";

/// Default `Upgrade` token on both sides
pub const DEFAULT_UPGRADE: &str = "aohttp";

/// Initiator handshake settings
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    /// Request target
    pub path: String,
    /// Host header value
    pub host: String,
    /// Upgrade token
    pub upgrade: String,
    /// How long to wait for the response head
    pub response_timeout: Duration,
}

impl InitiatorConfig {
    /// Settings for dialing `target`, sending `fake_host` as Host unless it is
    /// empty.
    pub fn new(path: &str, fake_host: &str, target: &str, upgrade: &str) -> Self {
        Self {
            path: path.to_string(),
            host: effective_host(fake_host, target).to_string(),
            upgrade: upgrade.to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PATH, "localhost", "localhost", DEFAULT_UPGRADE)
    }
}

/// The Host header: the configured fake host, or the target name when empty
pub fn effective_host<'a>(fake_host: &'a str, target: &'a str) -> &'a str {
    if fake_host.is_empty() {
        target
    } else {
        fake_host
    }
}

/// Acceptor validation settings
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Only accepted request target (compared case-insensitively)
    pub path: String,
    /// Only accepted method
    pub method: String,
    /// Only accepted `Upgrade` token
    pub upgrade: String,
    /// Answer header mismatches with 404 instead of 426
    pub hidden: bool,
}

impl Default for AcceptorConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            method: "GET".to_string(),
            upgrade: DEFAULT_UPGRADE.to_string(),
            hidden: false,
        }
    }
}
