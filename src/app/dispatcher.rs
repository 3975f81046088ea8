//! Dispatcher - per-connection session orchestration (acceptor side)
//!
//! ```text
//! accepted Connection
//!     → Session.wrap_server()          (TLS when configured)
//!     → AcceptorHandshake.receive()    400 on malformed request
//!     → AcceptorHandshake.validate()   404 / 426 on rejection
//!     → Transport.connect(backend)     500 on dial failure
//!     → AcceptorHandshake.establish()  101
//!     → relay(client, backend)
//! ```
//!
//! Each connection is handled in a separate tokio task. Nothing here is
//! shared between connections except the immutable settings.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::common::{Address, Connection, Result};
use crate::error::Error;
use crate::protocol::{AcceptorConfig, AcceptorHandshake};
use crate::relay::{format_bytes, relay};
use crate::session::Session;
use crate::transport::Transport;

/// Bridges accepted connections to the local backend
pub struct Dispatcher {
    config: Arc<AcceptorConfig>,
    backend: Address,
    transport: Arc<dyn Transport>,
    session: Arc<dyn Session>,
}

impl Dispatcher {
    pub fn new(
        config: AcceptorConfig,
        backend: Address,
        transport: Arc<dyn Transport>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            transport,
            session,
        }
    }

    pub fn backend(&self) -> &Address {
        &self.backend
    }

    /// Run one accepted connection to completion.
    ///
    /// Every error is scoped to this connection; the caller only logs it.
    pub async fn dispatch(&self, conn: Connection, conn_id: u64) -> Result<()> {
        let start = Instant::now();
        let source = conn.peer().to_string();

        let mut client = self.session.wrap_server(conn).await?;
        let mut handshake = AcceptorHandshake::new(self.config.clone());

        let request = handshake.receive(&mut client).await?;
        info!(
            "[#{}] {} {} [{}]",
            conn_id,
            request.method,
            request.target,
            request.host()
        );

        if let Err(e) = handshake.validate(&request) {
            if let Error::ValidationRejected { status, reason } = &e {
                info!("[#{}] Rejected with {}: {}", conn_id, status, reason);
            }
            if let Err(write_err) = handshake.reject(&mut client).await {
                debug!("[#{}] Rejection not delivered: {}", conn_id, write_err);
            }
            let _ = client.close().await;
            return Err(e);
        }

        let backend = match self.transport.connect(&self.backend).await {
            Ok(backend) => backend,
            Err(e) => {
                warn!("[#{}] Backend {} unreachable: {}", conn_id, self.backend, e);
                handshake.backend_failed(&mut client).await?;
                let _ = client.close().await;
                return Err(e);
            }
        };
        debug!("[#{}] Backend {} connected", conn_id, self.backend);

        handshake.establish(&mut client).await?;
        info!("[#{}] {} <-> {} established", conn_id, source, self.backend);

        let stats = relay(client, backend).await?;
        info!(
            "[#{}] Closed: {} <-> {} (↑{} ↓{} {:?})",
            conn_id,
            source,
            self.backend,
            format_bytes(stats.upload),
            format_bytes(stats.download),
            start.elapsed()
        );

        Ok(())
    }
}
