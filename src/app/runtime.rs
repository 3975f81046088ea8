//! Runtime - role entry points
//!
//! - `Acceptor`: accept loop, one task per connection, until shutdown
//! - `Initiator`: one local connection, one tunnel, then return

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::common::{Address, Result};
use crate::config::{ClientConfig, ServerConfig};
use crate::protocol::InitiatorHandshake;
use crate::relay::{format_bytes, relay, RelayStats};
use crate::session::{create_session, Session};
use crate::transport::{Listener, TcpTransport, Transport};

use super::dispatcher::Dispatcher;

/// Acceptor role: listens and hands every connection to the dispatcher
pub struct Acceptor {
    listener: Box<dyn Listener>,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Acceptor {
    /// Build the acceptor from configuration and bind its listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new());
        let session = create_session(&config.session())?;
        let listener = transport.bind(&config.bind_address()).await?;

        let dispatcher = Dispatcher::new(
            config.acceptor(),
            config.backend_address(),
            transport,
            session,
        );
        Ok(Self::new(listener, dispatcher))
    }

    pub fn new(listener: Box<dyn Listener>, dispatcher: Dispatcher) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn local_addr(&self) -> Result<Address> {
        self.listener.local_addr()
    }

    /// Sending on the returned channel stops the accept loop
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve until Ctrl+C, or until the accept loop ends on its own
    pub async fn serve(self) -> Result<()> {
        let shutdown_tx = self.shutdown_handle();
        let mut handle = tokio::spawn(self.run());

        let joined = tokio::select! {
            joined = &mut handle => joined,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down...");
                let _ = shutdown_tx.send(());
                handle.await
            }
        };

        match joined {
            Ok(result) => result,
            Err(e) => {
                error!("Accept loop panicked: {}", e);
                Ok(())
            }
        }
    }

    /// Accept loop. Returns once a shutdown signal arrives; tunnels still
    /// running are left to finish on their own.
    pub async fn run(self) -> Result<()> {
        info!(
            "[server] Listening on {}, backend {}",
            self.local_addr()?,
            self.dispatcher.backend()
        );
        let Self {
            listener,
            dispatcher,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
        } = self;

        let mut conn_count: u64 = 0;

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(conn) => {
                            conn_count += 1;
                            let conn_id = conn_count;
                            let source = conn.peer().to_string();
                            debug!("[server] New connection #{} from {}", conn_id, source);

                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                if let Err(e) = dispatcher.dispatch(conn, conn_id).await {
                                    warn!("Connection #{} from {} error: {}", conn_id, source, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("[server] Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("[server] Shutting down (handled {} connections)", conn_count);
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Initiator role: exactly one tunnel per run
pub struct Initiator {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: Arc<dyn Session>,
}

impl Initiator {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let session = create_session(&config.session())?;

        Ok(Self {
            config,
            transport: Arc::new(TcpTransport::new()),
            session,
        })
    }

    /// Bind the local listener the application will connect to
    pub async fn bind(&self) -> Result<Box<dyn Listener>> {
        self.transport.bind(&self.config.listen_address()).await
    }

    /// Bind, then serve one tunnel
    pub async fn run(&self) -> Result<RelayStats> {
        let listener = self.bind().await?;
        self.run_with(listener.as_ref()).await
    }

    /// Serve one tunnel on an already bound listener.
    ///
    /// The local connection is accepted first; the target is only dialed
    /// once there is something to carry.
    pub async fn run_with(&self, listener: &dyn Listener) -> Result<RelayStats> {
        info!("[client] Waiting for connections on {}...", listener.local_addr()?);
        let local = listener.accept().await?;
        debug!("[client] Accepted {}", local.peer());

        let target = self.config.target_address();
        info!("[client] Connecting to {}...", target);
        let remote = self.transport.connect(&target).await?;
        let mut remote = self.session.wrap_client(remote, &self.config.target).await?;
        if remote.is_encrypted() {
            debug!("[client] TLS established with {}", self.config.target);
        }

        let mut handshake = InitiatorHandshake::new(self.config.handshake());
        handshake.perform(&mut remote).await?;
        info!("[client] Tunnel established via {}{}", target, self.config.path);

        let stats = relay(local, remote).await?;
        info!(
            "[client] Closed (↑{} ↓{})",
            format_bytes(stats.upload),
            format_bytes(stats.download)
        );
        Ok(stats)
    }
}
