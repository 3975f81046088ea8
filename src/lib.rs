//! aohttp - byte-stream tunnel over an HTTP/1.1 upgrade
//!
//! # Architecture (Layered Pipeline)
//!
//! ```text
//! Initiator:
//!   local accept → Transport.connect(target) → Session (TLS?)
//!   → upgrade request / 101 → Relay(local, remote)
//!
//! Acceptor:
//!   Transport.accept → Session (TLS?) → upgrade request
//!   → validate → Transport.connect(backend) → 101 → Relay(client, backend)
//! ```
//!
//! ## Core Principles
//!
//! - Each layer does ONE thing
//! - All layers abstracted via traits
//! - After the handshake the bytes are opaque
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Stream, Connection, Address
//! ├── transport/       # Transport layer: TCP
//! ├── session/         # Session layer: plain, TLS
//! ├── protocol/        # Upgrade handshake: codec, initiator, acceptor
//! ├── relay.rs         # Bidirectional copy
//! └── app/             # Application: Dispatcher, Acceptor, Initiator
//! ```

// Core types
pub mod common;
pub mod error;

// Layered architecture
pub mod transport;
pub mod session;
pub mod protocol;
pub mod relay;
pub mod app;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{Address, Connection, Stream};
pub use error::{Error, Result};
pub use config::Config;

// Architecture re-exports
pub use app::{Acceptor, Dispatcher, Initiator};
pub use relay::{relay, RelayStats};
pub use session::Session;
pub use transport::{Listener, Transport};
