//! Common types and abstractions
//!
//! - Stream: unified async I/O abstraction
//! - Connection: a Stream with peer identity and close semantics
//! - Address: network address representation

mod address;
mod stream;

pub use address::Address;
pub use stream::{AsyncReadWrite, Connection, IntoStream, Stream};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
