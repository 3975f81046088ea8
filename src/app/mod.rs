//! Application Layer
//!
//! This module contains:
//! - Dispatcher: per-connection flow (handshake → backend → relay)
//! - Runtime: the acceptor accept loop and the initiator's single tunnel

mod dispatcher;
mod runtime;

pub use dispatcher::Dispatcher;
pub use runtime::{Acceptor, Initiator};
