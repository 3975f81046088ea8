//! Plain session - no-op passthrough

use async_trait::async_trait;

use crate::common::{Connection, Result};

use super::Session;

/// Plain session that passes through without modification
pub struct PlainSession;

#[async_trait]
impl Session for PlainSession {
    async fn wrap_client(&self, conn: Connection, _peer_name: &str) -> Result<Connection> {
        Ok(conn)
    }

    async fn wrap_server(&self, conn: Connection) -> Result<Connection> {
        Ok(conn)
    }
}
