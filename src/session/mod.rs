//! Session Layer
//!
//! Responsibilities:
//! - TLS encryption/decryption
//!
//! This layer transforms raw transport connections into secure ones.
//! It does NOT parse the upgrade handshake.

mod plain;
mod tls;

pub use plain::PlainSession;
pub use tls::TlsSession;

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::{Connection, Result};

/// Session trait for wrapping connections with encryption
#[async_trait]
pub trait Session: Send + Sync {
    /// Wrap a dialed connection (client-side: initiate handshake).
    ///
    /// `peer_name` is the name the remote is expected to present.
    async fn wrap_client(&self, conn: Connection, peer_name: &str) -> Result<Connection>;

    /// Wrap an accepted connection (server-side: accept handshake)
    async fn wrap_server(&self, conn: Connection) -> Result<Connection>;
}

/// TLS configuration
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Server name for SNI, overrides the dialed peer name
    pub server_name: Option<String>,
    /// Allow insecure certificates
    pub allow_insecure: bool,
    /// Certificate file path (for server)
    pub certificate_file: Option<String>,
    /// Private key file path (for server)
    pub key_file: Option<String>,
}

/// Session configuration
#[derive(Debug, Clone, Default)]
pub enum SessionConfig {
    /// No session layer (plain passthrough)
    #[default]
    Plain,
    /// TLS session
    Tls(TlsConfig),
}

/// Create a session from configuration
pub fn create_session(config: &SessionConfig) -> Result<Arc<dyn Session>> {
    Ok(match config {
        SessionConfig::Plain => Arc::new(PlainSession),
        SessionConfig::Tls(tls_config) => Arc::new(TlsSession::new(tls_config.clone())?),
    })
}
