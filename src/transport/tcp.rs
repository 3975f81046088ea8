//! TCP Transport implementation

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::debug;

use crate::common::{Address, Connection, Result};
use crate::error::Error;

use super::{Listener, Transport};

/// TCP transport - raw TCP connections
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Resolve an address to the socket addresses to try, in order.
    pub async fn resolve(addr: &Address) -> Result<Vec<SocketAddr>> {
        match addr {
            Address::Socket(socket_addr) => Ok(vec![*socket_addr]),
            Address::Domain(host, port) => {
                let resolved: Vec<SocketAddr> = lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| Error::ResolveFailed {
                        host: host.clone(),
                        reason: e.to_string(),
                    })?
                    .collect();
                if resolved.is_empty() {
                    return Err(Error::ResolveFailed {
                        host: host.clone(),
                        reason: "no addresses found".into(),
                    });
                }
                debug!("Resolved {} to {:?}", host, resolved);
                Ok(resolved)
            }
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: &Address) -> Result<Connection> {
        let candidates = Self::resolve(addr).await?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect(candidate).await {
                Ok(stream) => {
                    // Disable Nagle's algorithm for lower latency
                    stream.set_nodelay(true)?;
                    return Ok(Connection::new(stream, addr.to_string()));
                }
                Err(e) => {
                    debug!("Dial {} ({}) failed: {}", addr, candidate, e);
                    last_err = Some(e);
                }
            }
        }

        Err(Error::DialFailed {
            addr: addr.clone(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address to dial")
            }),
        })
    }

    async fn bind(&self, addr: &Address) -> Result<Box<dyn Listener>> {
        let candidates = Self::resolve(addr).await?;

        let listener = TcpListener::bind(candidates.as_slice())
            .await
            .map_err(|source| Error::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        Ok(Box::new(TcpListenerWrapper { listener }))
    }
}

/// Wrapper for TcpListener to implement Listener trait
struct TcpListenerWrapper {
    listener: TcpListener,
}

#[async_trait]
impl Listener for TcpListenerWrapper {
    async fn accept(&self) -> Result<Connection> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(Connection::new(stream, addr.to_string()))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::Socket(self.listener.local_addr()?))
    }
}
