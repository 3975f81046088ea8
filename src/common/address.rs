//! Address type for dialing and binding

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Network address representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP socket address (IP + port)
    Socket(SocketAddr),
    /// Host name with port, resolved when dialed or bound
    Domain(String, u16),
}

impl Address {
    /// Build an address from a host string and a port.
    ///
    /// IP literals (including bracketed IPv6) become [`Address::Socket`],
    /// anything else is kept as a name for later resolution.
    pub fn from_host_port(host: &str, port: u16) -> Self {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        match bare.parse::<IpAddr>() {
            Ok(ip) => Address::Socket(SocketAddr::new(ip, port)),
            Err(_) => Address::Domain(host.to_string(), port),
        }
    }

    /// Loopback address on the given port
    pub fn loopback(port: u16) -> Self {
        Address::Socket(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Socket(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}
